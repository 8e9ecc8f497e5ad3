//! Fetch exchange: request wants, receive a pack, deposit its objects
//! into the object store.
//!
//! The engine fetches in two shapes: the ref tip with `filter
//! blob:none` (trees and commits only), and individual blobs by OID. A
//! server that has nothing new to send may answer with an empty pack or
//! no pack at all; both are success.

use std::io::Read;

use gitkv_hash::ObjectId;
use gitkv_pack::read::index_pack;
use gitkv_store::MemoryStore;
use gitkv_transport::Transport;

use crate::capability::{self, Capabilities, SidebandMode};
use crate::pktline::{strip_newline, Packet, PktReader, PktWriter};
use crate::sideband::SidebandReader;
use crate::ProtocolError;

/// Result of a fetch exchange.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Objects deposited into the store.
    pub objects_indexed: usize,
}

/// Perform a fetch over an upload-pack connection whose advertisement
/// has already been consumed.
///
/// With `filter_blobs`, and where the server advertised the `filter`
/// capability, blob contents are omitted from the returned pack.
pub fn fetch(
    transport: &mut dyn Transport,
    server_caps: &Capabilities,
    wants: &[ObjectId],
    filter_blobs: bool,
    store: &MemoryStore,
) -> Result<FetchOutcome, ProtocolError> {
    if wants.is_empty() {
        return Ok(FetchOutcome::default());
    }

    let client_caps = capability::negotiate_fetch(server_caps, filter_blobs);
    let use_filter = client_caps.iter().any(|c| c == "filter");
    let sideband = capability::select_sideband(server_caps);

    {
        let mut writer = PktWriter::new(transport.writer());
        for (i, want) in wants.iter().enumerate() {
            if i == 0 {
                writer.write_text(&format!("want {} {}", want, client_caps.join(" ")))?;
            } else {
                writer.write_text(&format!("want {want}"))?;
            }
        }
        if use_filter {
            writer.write_text("filter blob:none")?;
        }
        writer.write_flush()?;
        // No haves: the local store is ephemeral, so negotiation always
        // starts from nothing.
        writer.write_text("done")?;
        writer.flush()?;
    }
    transport.flush_request()?;

    consume_acks(transport)?;
    let pack_data = receive_pack_data(transport, sideband)?;

    tracing::debug!(bytes = pack_data.len(), "fetch pack received");

    let summary = index_pack(&pack_data, store)?;
    Ok(FetchOutcome {
        objects_indexed: summary.objects_indexed,
    })
}

/// Consume the ACK/NAK section preceding the pack.
///
/// Without multi_ack the server answers a haveless request with a
/// single NAK; tolerate stray ACKs anyway.
fn consume_acks(transport: &mut dyn Transport) -> Result<(), ProtocolError> {
    let mut reader = PktReader::new(transport.reader());
    loop {
        match reader.read_packet()? {
            Packet::Data(data) => {
                let line = strip_newline(&data);
                if line == b"NAK" {
                    return Ok(());
                }
                if line.starts_with(b"ACK ") {
                    continue;
                }
                return Err(ProtocolError::Protocol(format!(
                    "unexpected response to fetch request: {}",
                    String::from_utf8_lossy(line)
                )));
            }
            Packet::Flush => return Ok(()),
            _ => return Ok(()),
        }
    }
}

/// Read the pack bytes, demultiplexing sideband when negotiated.
fn receive_pack_data(
    transport: &mut dyn Transport,
    sideband: SidebandMode,
) -> Result<Vec<u8>, ProtocolError> {
    match sideband {
        SidebandMode::None => {
            let mut data = Vec::new();
            transport.reader().read_to_end(&mut data)?;
            Ok(data)
        }
        SidebandMode::Band | SidebandMode::Band64k => {
            let mut demux = SidebandReader::new(PktReader::new(transport.reader()));
            demux.read_all_data()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitkv_object::ObjectType;
    use gitkv_pack::encode::encode_pack;
    use crate::pktline::PktWriter;
    use std::io::{Cursor, Write};

    /// In-memory transport capturing writes and replaying a scripted
    /// response.
    struct ScriptedTransport {
        request: Vec<u8>,
        response: Cursor<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(response: Vec<u8>) -> Self {
            Self {
                request: Vec::new(),
                response: Cursor::new(response),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn reader(&mut self) -> &mut dyn Read {
            &mut self.response
        }

        fn writer(&mut self) -> &mut dyn Write {
            &mut self.request
        }

        fn flush_request(&mut self) -> Result<(), gitkv_transport::TransportError> {
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<(), gitkv_transport::TransportError> {
            Ok(())
        }
    }

    fn nak_then_raw_pack(pack: &[u8]) -> Vec<u8> {
        let mut response = Vec::new();
        PktWriter::new(&mut response).write_text("NAK").unwrap();
        response.extend_from_slice(pack);
        response
    }

    #[test]
    fn fetch_deposits_objects() {
        let mut pack = Vec::new();
        encode_pack(
            &[(ObjectType::Blob, b"content1".to_vec())],
            &mut pack,
        )
        .unwrap();

        let mut transport = ScriptedTransport::new(nak_then_raw_pack(&pack));
        let store = MemoryStore::new();
        let want = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();

        let outcome = fetch(
            &mut transport,
            &Capabilities::parse(""),
            &[want],
            false,
            &store,
        )
        .unwrap();

        assert_eq!(outcome.objects_indexed, 1);
        assert_eq!(store.len(), 1);

        // The request carried the want and the done.
        let sent = String::from_utf8_lossy(&transport.request);
        assert!(sent.contains(&format!("want {want}")));
        assert!(sent.contains("done"));
        assert!(!sent.contains("filter"));
    }

    #[test]
    fn fetch_requests_filter_when_supported() {
        let mut pack = Vec::new();
        encode_pack::<&[u8]>(&[], &mut pack).unwrap();

        let mut transport = ScriptedTransport::new(nak_then_raw_pack(&pack));
        let store = MemoryStore::new();
        let want = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();

        fetch(
            &mut transport,
            &Capabilities::parse("filter"),
            &[want],
            true,
            &store,
        )
        .unwrap();

        let sent = String::from_utf8_lossy(&transport.request);
        assert!(sent.contains("filter blob:none"));
    }

    #[test]
    fn empty_pack_is_no_new_objects() {
        let mut pack = Vec::new();
        encode_pack::<&[u8]>(&[], &mut pack).unwrap();

        let mut transport = ScriptedTransport::new(nak_then_raw_pack(&pack));
        let store = MemoryStore::new();
        let want = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();

        let outcome = fetch(
            &mut transport,
            &Capabilities::parse(""),
            &[want],
            false,
            &store,
        )
        .unwrap();
        assert_eq!(outcome.objects_indexed, 0);
    }

    #[test]
    fn missing_pack_is_no_new_objects() {
        // NAK followed by nothing at all.
        let mut response = Vec::new();
        PktWriter::new(&mut response).write_text("NAK").unwrap();

        let mut transport = ScriptedTransport::new(response);
        let store = MemoryStore::new();
        let want = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();

        let outcome = fetch(
            &mut transport,
            &Capabilities::parse(""),
            &[want],
            false,
            &store,
        )
        .unwrap();
        assert_eq!(outcome.objects_indexed, 0);
    }

    #[test]
    fn fetch_through_sideband() {
        let mut pack = Vec::new();
        encode_pack(&[(ObjectType::Blob, b"sb".to_vec())], &mut pack).unwrap();

        let mut response = Vec::new();
        {
            let mut writer = PktWriter::new(&mut response);
            writer.write_text("NAK").unwrap();
            let mut framed = vec![1u8];
            framed.extend_from_slice(&pack);
            writer.write_data(&framed).unwrap();
            writer.write_flush().unwrap();
        }

        let mut transport = ScriptedTransport::new(response);
        let store = MemoryStore::new();
        let want = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();

        let outcome = fetch(
            &mut transport,
            &Capabilities::parse("side-band-64k"),
            &[want],
            false,
            &store,
        )
        .unwrap();
        assert_eq!(outcome.objects_indexed, 1);
    }

    #[test]
    fn no_wants_is_a_noop() {
        let mut transport = ScriptedTransport::new(Vec::new());
        let store = MemoryStore::new();
        let outcome = fetch(
            &mut transport,
            &Capabilities::parse(""),
            &[],
            false,
            &store,
        )
        .unwrap();
        assert_eq!(outcome.objects_indexed, 0);
        assert!(transport.request.is_empty());
    }
}
