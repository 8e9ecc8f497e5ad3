/// Errors produced by hash and object-id operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex length: expected {expected}, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid hex character {character:?} at position {position}")]
    InvalidHex { character: char, position: usize },

    #[error("invalid digest length: expected {expected}, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("SHA-1 collision attack detected")]
    Sha1Collision,
}
