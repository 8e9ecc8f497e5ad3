use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// Number of bytes in an object id digest.
pub const OID_LEN: usize = 20;

/// A git object identifier — the SHA-1 of an object's framed content.
///
/// The all-zero id is a sentinel meaning "absent" (`ObjectId::NULL`); it
/// is used for the old side of a ref creation and as the "no entry"
/// result of path lookups.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OID_LEN]);

impl ObjectId {
    /// The null (all-zeros) object id.
    pub const NULL: Self = Self([0u8; OID_LEN]);

    /// Create an ObjectId from raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != OID_LEN {
            return Err(HashError::InvalidDigestLength {
                expected: OID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Create an ObjectId from a 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let mut bytes = [0u8; OID_LEN];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }
}

impl From<[u8; OID_LEN]> for ObjectId {
    fn from(bytes: [u8; OID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
