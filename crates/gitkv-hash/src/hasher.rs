//! Streaming SHA-1 computation with collision detection.

use crate::{HashError, ObjectId};

/// Streaming hash computation over object content.
///
/// Data can be fed incrementally with [`update`](Hasher::update) or
/// through the [`std::io::Write`] implementation, then finalised into
/// an [`ObjectId`]. Finalisation fails if the SHA-1 collision detector
/// fires.
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Hasher {
    pub fn new() -> Self {
        use digest::Digest;
        Self {
            inner: Box::new(sha1_checked::Sha1::new()),
        }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        self.inner.update(data);
    }

    /// Finalize and return the ObjectId.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        ObjectId::from_bytes(result.hash().as_slice())
    }

    /// Hash a buffer in one call.
    pub fn digest(data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Hash a git object: `"<kind> <len>\0<content>"`.
    pub fn hash_object(kind: &str, data: &[u8]) -> Result<ObjectId, HashError> {
        let header = format!("{} {}\0", kind, data.len());
        let mut h = Self::new();
        h.update(header.as_bytes());
        h.update(data);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
