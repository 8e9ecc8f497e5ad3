//! Git object model: blob, tree, commit, tag parsing and serialization.
//!
//! Provides Rust types for git's four object types, their parsing from
//! raw payload bytes, serialization to the canonical format, and the
//! `Signature` identity attached to commits and tags.

mod blob;
mod commit;
pub mod header;
mod signature;
mod tag;
mod tree;

pub use blob::Blob;
pub use commit::Commit;
pub use signature::Signature;
pub use tag::Tag;
pub use tree::{EntryMode, Tree, TreeEntry};

use bstr::BString;
use gitkv_hash::{HashError, Hasher, ObjectId};

/// Errors produced by object operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("invalid commit: missing '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("invalid tag: missing '{field}' header")]
    MissingTagField { field: &'static str },

    #[error("invalid entry mode: {0}")]
    InvalidEntryMode(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four kinds of git objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    /// Parse from the type string in object headers.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    /// The canonical type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Type number as used in packfile entry headers.
    pub fn pack_type_number(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Inverse of [`pack_type_number`](Self::pack_type_number).
    pub fn from_pack_type_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// A parsed git object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    /// Parse from payload bytes with known type (no framing header).
    pub fn parse(obj_type: ObjectType, payload: &[u8]) -> Result<Self, ObjectError> {
        match obj_type {
            ObjectType::Blob => Ok(Self::Blob(Blob::parse(payload))),
            ObjectType::Tree => Ok(Self::Tree(Tree::parse(payload)?)),
            ObjectType::Commit => Ok(Self::Commit(Commit::parse(payload)?)),
            ObjectType::Tag => Ok(Self::Tag(Tag::parse(payload)?)),
        }
    }

    /// Serialize the payload (no framing header).
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone(),
            Self::Tree(t) => t.serialize(),
            Self::Commit(c) => c.serialize(),
            Self::Tag(t) => t.serialize(),
        }
    }

    /// The object's kind.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
            Self::Tag(_) => ObjectType::Tag,
        }
    }

    /// Compute the OID by hashing the framed serialized form.
    pub fn compute_oid(&self) -> Result<ObjectId, HashError> {
        Hasher::hash_object(self.object_type().as_str(), &self.serialize())
    }
}
