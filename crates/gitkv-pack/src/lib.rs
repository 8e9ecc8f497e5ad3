//! Packfile reading and writing.
//!
//! Packs are the wire format of the smart protocol. The fetch side
//! indexes server-sent packs (including deltified entries) into the
//! object store; the push side encodes a pack of locally created
//! objects, non-delta only.

pub mod delta;
pub mod encode;
pub mod entry;
pub mod read;

use gitkv_hash::ObjectId;
use gitkv_object::ObjectType;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("pack checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Store(#[from] gitkv_store::StoreError),

    #[error(transparent)]
    Hash(#[from] gitkv_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Kind of a raw pack entry, before delta resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryKind {
    Base(ObjectType),
    /// Delta whose base lives earlier in the same pack, at an absolute offset.
    OfsDelta { base_offset: u64 },
    /// Delta referencing its base by OID.
    RefDelta { base_oid: ObjectId },
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;
/// Header plus trailing checksum: the size of a valid empty pack.
pub const PACK_MIN_SIZE: usize = PACK_HEADER_SIZE + 20;
