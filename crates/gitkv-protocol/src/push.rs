//! Push exchange: one ref update command plus a pack, then the
//! server's report-status.
//!
//! The engine only ever pushes a single fast-forward update of one
//! branch, atomically where the server supports it. The parsed report
//! distinguishes acceptance, per-ref rejection (the retry loop's
//! signal), and unpack failure.

use gitkv_hash::ObjectId;
use gitkv_transport::Transport;

use crate::capability::{self, Capabilities, SidebandMode};
use crate::pktline::{PktReader, PktWriter};
use crate::sideband::SidebandReader;
use crate::ProtocolError;

/// A single ref update command.
#[derive(Debug, Clone)]
pub struct RefUpdate {
    /// Full ref name, e.g. `refs/heads/main`.
    pub refname: String,
    /// Expected current OID on the remote (null to create).
    pub old: ObjectId,
    /// New OID (null to delete).
    pub new: ObjectId,
}

/// Per-ref result from the report-status section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefStatus {
    Ok,
    /// `ng <refname> <reason>` — non-fast-forward, lock failure, hook
    /// rejection, ...
    Rejected(String),
}

/// Parsed push report.
#[derive(Debug)]
pub struct PushReport {
    /// Whether the server unpacked the pack successfully.
    pub unpack_ok: bool,
    /// Status of the single pushed ref.
    pub status: RefStatus,
}

impl PushReport {
    pub fn accepted(&self) -> bool {
        self.unpack_ok && self.status == RefStatus::Ok
    }
}

/// Perform a push over a receive-pack connection whose advertisement
/// has already been consumed.
pub fn push(
    transport: &mut dyn Transport,
    server_caps: &Capabilities,
    update: &RefUpdate,
    pack_data: &[u8],
    atomic: bool,
) -> Result<PushReport, ProtocolError> {
    let client_caps = capability::negotiate_push(server_caps, atomic);
    let has_report_status = client_caps.iter().any(|c| c == "report-status");
    let sideband = if client_caps.iter().any(|c| c == "side-band-64k") {
        SidebandMode::Band64k
    } else {
        SidebandMode::None
    };

    {
        let mut writer = PktWriter::new(transport.writer());
        writer.write_text(&format!(
            "{} {} {}\0{}",
            update.old,
            update.new,
            update.refname,
            client_caps.join(" ")
        ))?;
        writer.write_flush()?;
        // The pack follows the command section unframed.
        use std::io::Write;
        writer.inner_mut().write_all(pack_data)?;
        writer.flush()?;
    }
    transport.flush_request()?;

    tracing::debug!(
        refname = %update.refname,
        old = %update.old,
        new = %update.new,
        pack_bytes = pack_data.len(),
        "push command sent"
    );

    if !has_report_status {
        // Nothing to parse; trust the transport.
        return Ok(PushReport {
            unpack_ok: true,
            status: RefStatus::Ok,
        });
    }

    parse_report_status(transport, sideband, &update.refname)
}

/// Parse the server's report-status section.
fn parse_report_status(
    transport: &mut dyn Transport,
    sideband: SidebandMode,
    refname: &str,
) -> Result<PushReport, ProtocolError> {
    let status_lines = match sideband {
        SidebandMode::None => {
            let mut reader = PktReader::new(transport.reader());
            reader.read_until_flush()?
        }
        _ => {
            // The whole report is wrapped in sideband; unwrap, then
            // parse the inner pkt-lines.
            let mut demux = SidebandReader::new(PktReader::new(transport.reader()));
            let data = demux.read_all_data()?;
            let mut inner = PktReader::new(std::io::Cursor::new(data));
            inner.read_until_flush()?
        }
    };

    let mut unpack_ok = None;
    let mut status = None;

    for line_data in &status_lines {
        let line = String::from_utf8_lossy(line_data);
        let line = line.trim_end_matches('\n');

        if let Some(rest) = line.strip_prefix("unpack ") {
            unpack_ok = Some(rest == "ok");
        } else if let Some(rest) = line.strip_prefix("ok ") {
            if rest == refname {
                status = Some(RefStatus::Ok);
            }
        } else if let Some(rest) = line.strip_prefix("ng ") {
            let (name, reason) = match rest.split_once(' ') {
                Some((name, reason)) => (name, reason.to_string()),
                None => (rest, "unknown reason".to_string()),
            };
            if name == refname {
                status = Some(RefStatus::Rejected(reason));
            }
        }
    }

    let unpack_ok = unpack_ok.ok_or_else(|| {
        ProtocolError::Protocol("malformed unpack status: missing unpack line".into())
    })?;
    let status = status.ok_or_else(|| {
        ProtocolError::Protocol(format!("report-status missing ref {refname}"))
    })?;

    Ok(PushReport { unpack_ok, status })
}
