//! The consolidated operation error.
//!
//! Every failure surfaces as one tagged error carrying a kind, an
//! HTTP-equivalent status, a stable user-facing message, the retry
//! count accumulated before giving up, and the underlying cause for
//! diagnostics.

use gitkv_protocol::ProtocolError;
use gitkv_transport::TransportError;

/// Classification of an operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path or ref absent.
    NotFound,
    /// Create onto an existing path, or a server-reported conflict.
    Conflict,
    Unauthorized,
    Forbidden,
    /// Stale push (non-fast-forward). Internal: always retried, never
    /// surfaced to callers.
    RefNotCurrent,
    /// Network or I/O failure; retried.
    Transport,
    /// The remote violated protocol expectations; not retried.
    Protocol,
    /// Context canceled or deadline exceeded.
    Canceled,
    /// Endpoint misconfiguration (unknown scheme, bad URL).
    Config,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict | Self::RefNotCurrent => 409,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::Transport => 503,
            Self::Canceled => 499,
            Self::Protocol | Self::Config | Self::Internal => 500,
        }
    }

    /// Stable user-facing message, independent of the cause.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "Not Found",
            Self::Conflict | Self::RefNotCurrent => "Conflict",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::Transport => "Service Unavailable",
            Self::Canceled => "Canceled",
            Self::Protocol | Self::Internal => "Internal Server Error",
            Self::Config => "Invalid Configuration",
        }
    }

    /// Whether the retry loop should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RefNotCurrent | Self::Transport)
    }
}

/// An operation failure: kind plus cause chain plus retry count.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    retries: u32,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            retries: 0,
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            retries: 0,
            source: Some(source.into()),
        }
    }

    /// Shorthand for an `Internal` error with a message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_source(ErrorKind::Internal, message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Failed attempts that preceded this failure.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.source {
            Some(ref source) => write!(f, "{}: {}", self.user_message(), source),
            None => f.write_str(self.user_message()),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        let kind = match &err {
            TransportError::Http { status: 401, .. } => ErrorKind::Unauthorized,
            TransportError::Http { status: 403, .. } => ErrorKind::Forbidden,
            TransportError::UnsupportedScheme(_) | TransportError::InvalidUrl(_) => {
                ErrorKind::Config
            }
            _ => ErrorKind::Transport,
        };
        Self::with_source(kind, err)
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Transport(transport) => transport.into(),
            ProtocolError::Io(io) => Self::with_source(ErrorKind::Transport, io),
            other => Self::with_source(ErrorKind::Protocol, other),
        }
    }
}
