//! Sideband demultiplexing.
//!
//! During pack transfer the server multiplexes three channels over
//! pkt-lines: band 1 carries pack data, band 2 progress chatter, band 3
//! a fatal error message.

use std::io::Read;

use crate::pktline::{Packet, PktReader};
use crate::ProtocolError;

/// Demultiplexer over a pkt-line stream.
pub struct SidebandReader<R> {
    reader: PktReader<R>,
}

impl<R: Read> SidebandReader<R> {
    pub fn new(reader: PktReader<R>) -> Self {
        Self { reader }
    }

    /// Read the next band-1 chunk.
    ///
    /// Progress messages are logged; a band-3 message aborts with a
    /// server error. Returns `None` at the end of the stream.
    pub fn read_data(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        loop {
            match self.reader.read_packet()? {
                Packet::Flush | Packet::Delimiter | Packet::ResponseEnd => return Ok(None),
                Packet::Data(data) => {
                    if data.is_empty() {
                        return Ok(None);
                    }
                    let payload = &data[1..];
                    match data[0] {
                        1 => return Ok(Some(payload.to_vec())),
                        2 => {
                            let msg = String::from_utf8_lossy(payload);
                            tracing::debug!(remote = %msg.trim_end(), "sideband progress");
                        }
                        3 => {
                            let msg = String::from_utf8_lossy(payload).trim_end().to_string();
                            return Err(ProtocolError::ServerError(msg));
                        }
                        band => {
                            return Err(ProtocolError::Protocol(format!(
                                "unknown sideband channel: {band}"
                            )));
                        }
                    }
                }
            }
        }
    }

    /// Drain band 1 into a single buffer.
    pub fn read_all_data(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut result = Vec::new();
        while let Some(chunk) = self.read_data()? {
            result.extend_from_slice(&chunk);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::PktWriter;
    use std::io::Cursor;

    fn sideband_packet(band: u8, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut pkt = vec![band];
        pkt.extend_from_slice(data);
        PktWriter::new(&mut buf).write_data(&pkt).unwrap();
        buf
    }

    #[test]
    fn data_band_passes_through() {
        let mut buf = sideband_packet(1, b"pack bytes");
        buf.extend_from_slice(b"0000");

        let mut sb = SidebandReader::new(PktReader::new(Cursor::new(buf)));
        assert_eq!(sb.read_data().unwrap().unwrap(), b"pack bytes");
        assert!(sb.read_data().unwrap().is_none());
    }

    #[test]
    fn progress_band_skipped() {
        let mut buf = sideband_packet(2, b"Counting objects: 5\n");
        buf.extend_from_slice(&sideband_packet(1, b"actual data"));
        buf.extend_from_slice(b"0000");

        let mut sb = SidebandReader::new(PktReader::new(Cursor::new(buf)));
        assert_eq!(sb.read_data().unwrap().unwrap(), b"actual data");
    }

    #[test]
    fn error_band_aborts() {
        let mut buf = sideband_packet(3, b"repository not found");
        buf.extend_from_slice(b"0000");

        let mut sb = SidebandReader::new(PktReader::new(Cursor::new(buf)));
        match sb.read_data().unwrap_err() {
            ProtocolError::ServerError(msg) => assert!(msg.contains("repository not found")),
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn unknown_band_rejected() {
        let mut buf = sideband_packet(9, b"?");
        buf.extend_from_slice(b"0000");
        let mut sb = SidebandReader::new(PktReader::new(Cursor::new(buf)));
        assert!(matches!(
            sb.read_data(),
            Err(ProtocolError::Protocol(_))
        ));
    }

    #[test]
    fn read_all_concatenates_chunks() {
        let mut buf = sideband_packet(1, b"chunk1");
        buf.extend_from_slice(&sideband_packet(1, b"chunk2"));
        buf.extend_from_slice(b"0000");

        let mut sb = SidebandReader::new(PktReader::new(Cursor::new(buf)));
        assert_eq!(sb.read_all_data().unwrap(), b"chunk1chunk2");
    }
}
