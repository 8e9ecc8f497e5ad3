//! Smart protocol client for fetch and push.
//!
//! Implements pkt-line framing, v0/v1 ref advertisements, capability
//! negotiation, sideband demultiplexing, and the two half-protocol
//! exchanges the engine needs: blob-filtered fetch into the object
//! store, and a single-command atomic push.

pub mod advertise;
pub mod capability;
pub mod fetch;
pub mod pktline;
pub mod push;
pub mod sideband;

use gitkv_transport::TransportError;

/// Errors that can occur during protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Pack(#[from] gitkv_pack::PackError),

    #[error(transparent)]
    Store(#[from] gitkv_store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
