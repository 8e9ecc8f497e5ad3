//! Pkt-line framing.
//!
//! Every packet carries a 4-hex-digit length prefix that includes the
//! length field itself. Lengths 0-2 are the special packets:
//! - `0000`: flush (end of section)
//! - `0001`: delimiter (protocol v2)
//! - `0002`: response-end (protocol v2)

use std::io::{Read, Write};

use crate::ProtocolError;

/// Maximum data per packet (65520 - 4).
pub const MAX_PKT_DATA_LEN: usize = 65516;

/// One pkt-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(Vec<u8>),
    Flush,
    Delimiter,
    ResponseEnd,
}

/// Pkt-line reader over any byte source.
pub struct PktReader<R> {
    reader: R,
}

impl<R: Read> PktReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read one packet.
    pub fn read_packet(&mut self) -> Result<Packet, ProtocolError> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::Protocol("unexpected EOF reading pkt-line length".into())
            } else {
                ProtocolError::Io(e)
            }
        })?;

        let len_str = std::str::from_utf8(&len_buf).map_err(|_| {
            ProtocolError::InvalidPktLine(format!("invalid length bytes: {len_buf:?}"))
        })?;
        let len = u16::from_str_radix(len_str, 16).map_err(|_| {
            ProtocolError::InvalidPktLine(format!("invalid length: {len_str:?}"))
        })?;

        match len {
            0 => Ok(Packet::Flush),
            1 => Ok(Packet::Delimiter),
            2 => Ok(Packet::ResponseEnd),
            3 => Err(ProtocolError::InvalidPktLine(
                "length 3 is invalid (minimum data packet is 4)".into(),
            )),
            _ => {
                let data_len = (len as usize) - 4;
                if data_len > MAX_PKT_DATA_LEN {
                    return Err(ProtocolError::InvalidPktLine(format!(
                        "packet too long: {data_len} bytes"
                    )));
                }
                let mut data = vec![0u8; data_len];
                self.reader.read_exact(&mut data)?;
                Ok(Packet::Data(data))
            }
        }
    }

    /// Read data packets until a flush, collecting them.
    pub fn read_until_flush(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut lines = Vec::new();
        while let Packet::Data(data) = self.read_packet()? {
            lines.push(data);
        }
        Ok(lines)
    }
}

/// Pkt-line writer over any byte sink.
pub struct PktWriter<W> {
    writer: W,
}

impl<W: Write> PktWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Write a data packet.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.len() > MAX_PKT_DATA_LEN {
            return Err(ProtocolError::InvalidPktLine(format!(
                "data too long for pkt-line: {} bytes (max {})",
                data.len(),
                MAX_PKT_DATA_LEN
            )));
        }
        write!(self.writer, "{:04x}", data.len() + 4)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Write a text line, appending `\n` if absent.
    pub fn write_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        if text.ends_with('\n') {
            self.write_data(text.as_bytes())
        } else {
            let mut data = text.as_bytes().to_vec();
            data.push(b'\n');
            self.write_data(&data)
        }
    }

    /// Write a flush packet.
    pub fn write_flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.write_all(b"0000")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Strip one trailing newline, the convention for text packets.
pub fn strip_newline(data: &[u8]) -> &[u8] {
    match data.last() {
        Some(b'\n') => &data[..data.len() - 1],
        _ => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_and_read_data() {
        let mut buf = Vec::new();
        PktWriter::new(&mut buf).write_data(b"hello").unwrap();
        assert_eq!(&buf, b"0009hello");

        let mut reader = PktReader::new(Cursor::new(buf));
        assert_eq!(reader.read_packet().unwrap(), Packet::Data(b"hello".to_vec()));
    }

    #[test]
    fn write_text_appends_newline() {
        let mut buf = Vec::new();
        PktWriter::new(&mut buf).write_text("hello").unwrap();
        assert_eq!(&buf, b"000ahello\n");
    }

    #[test]
    fn special_packets() {
        let mut reader = PktReader::new(Cursor::new(b"000000010002".to_vec()));
        assert_eq!(reader.read_packet().unwrap(), Packet::Flush);
        assert_eq!(reader.read_packet().unwrap(), Packet::Delimiter);
        assert_eq!(reader.read_packet().unwrap(), Packet::ResponseEnd);
    }

    #[test]
    fn length_three_invalid() {
        let mut reader = PktReader::new(Cursor::new(b"0003".to_vec()));
        assert!(reader.read_packet().is_err());
    }

    #[test]
    fn read_until_flush_collects_sections() {
        let mut buf = Vec::new();
        {
            let mut w = PktWriter::new(&mut buf);
            w.write_text("line1").unwrap();
            w.write_text("line2").unwrap();
            w.write_flush().unwrap();
            w.write_text("line3").unwrap();
            w.write_flush().unwrap();
        }

        let mut reader = PktReader::new(Cursor::new(buf));
        let first = reader.read_until_flush().unwrap();
        assert_eq!(first, vec![b"line1\n".to_vec(), b"line2\n".to_vec()]);
        let second = reader.read_until_flush().unwrap();
        assert_eq!(second, vec![b"line3\n".to_vec()]);
    }

    #[test]
    fn empty_data_packet() {
        let mut reader = PktReader::new(Cursor::new(b"0004".to_vec()));
        assert_eq!(reader.read_packet().unwrap(), Packet::Data(Vec::new()));
    }

    #[test]
    fn eof_is_protocol_error() {
        let mut reader = PktReader::new(Cursor::new(Vec::new()));
        assert!(matches!(
            reader.read_packet(),
            Err(ProtocolError::Protocol(_))
        ));
    }

    #[test]
    fn strip_newline_behaviour() {
        assert_eq!(strip_newline(b"abc\n"), b"abc");
        assert_eq!(strip_newline(b"abc"), b"abc");
        assert_eq!(strip_newline(b""), b"");
    }
}
