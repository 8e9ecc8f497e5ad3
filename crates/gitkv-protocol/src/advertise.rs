//! Ref advertisement parsing (protocol v0/v1).
//!
//! The server's first response enumerates refs, with capabilities after
//! a NUL on the first line. Over smart HTTP, a `# service=...`
//! announcement and a flush precede the advertisement. An empty
//! repository advertises the null OID under the pseudo-ref
//! `capabilities^{}`.

use bstr::BString;
use gitkv_hash::ObjectId;

use crate::capability::Capabilities;
use crate::pktline::{strip_newline, Packet, PktReader};
use crate::ProtocolError;

/// A parsed ref advertisement.
#[derive(Debug, Default)]
pub struct Advertisement {
    /// Advertised refs in server order.
    pub refs: Vec<(ObjectId, BString)>,
    /// Capabilities from the first advertisement line.
    pub capabilities: Capabilities,
}

impl Advertisement {
    /// OID of a ref by exact name.
    pub fn ref_oid(&self, name: &str) -> Option<ObjectId> {
        self.refs
            .iter()
            .find(|(_, refname)| refname.as_slice() == name.as_bytes())
            .map(|(oid, _)| *oid)
    }
}

/// Parse the advertisement from the start of a server response.
pub fn parse_advertisement<R: std::io::Read>(
    reader: &mut PktReader<R>,
) -> Result<Advertisement, ProtocolError> {
    let mut adv = Advertisement::default();
    let mut saw_first_ref_line = false;
    // The smart-HTTP service announcement section ends with its own
    // flush; the advertisement proper follows it.
    let mut skip_next_flush = false;

    loop {
        match reader.read_packet()? {
            Packet::Flush => {
                if skip_next_flush {
                    skip_next_flush = false;
                    continue;
                }
                break;
            }
            Packet::Delimiter | Packet::ResponseEnd => break,
            Packet::Data(data) => {
                let line = strip_newline(&data);
                if line.is_empty() {
                    continue;
                }
                if line.starts_with(b"#") {
                    skip_next_flush = true;
                    continue;
                }

                if !saw_first_ref_line {
                    saw_first_ref_line = true;
                    if let Some(nul_pos) = line.iter().position(|&b| b == 0) {
                        let caps = String::from_utf8_lossy(&line[nul_pos + 1..]);
                        adv.capabilities = Capabilities::parse(&caps);
                        parse_ref_line(&line[..nul_pos], &mut adv.refs)?;
                        continue;
                    }
                }
                parse_ref_line(line, &mut adv.refs)?;
            }
        }
    }

    Ok(adv)
}

/// Parse one `<40-hex-oid> <refname>` line.
fn parse_ref_line(
    line: &[u8],
    refs: &mut Vec<(ObjectId, BString)>,
) -> Result<(), ProtocolError> {
    let space_pos = line.iter().position(|&b| b == b' ').ok_or_else(|| {
        ProtocolError::Protocol(format!(
            "invalid ref line (no space): {}",
            String::from_utf8_lossy(line)
        ))
    })?;

    let oid_str = std::str::from_utf8(&line[..space_pos])
        .map_err(|_| ProtocolError::Protocol("invalid UTF-8 in OID".into()))?;
    let oid = ObjectId::from_hex(oid_str).map_err(|e| {
        ProtocolError::Protocol(format!("invalid OID in ref advertisement: {e}"))
    })?;

    let refname = &line[space_pos + 1..];

    // An empty repository advertises "<null-oid> capabilities^{}";
    // it carries the capability list but names no ref.
    if refname == b"capabilities^{}" {
        return Ok(());
    }

    refs.push((oid, BString::from(refname)));
    Ok(())
}
