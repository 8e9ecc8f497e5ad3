//! Object identity for gitkv.
//!
//! Provides the `ObjectId` content address (20-byte SHA-1), hex
//! encoding/decoding, and a streaming `Hasher` that applies git's
//! object framing.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;
