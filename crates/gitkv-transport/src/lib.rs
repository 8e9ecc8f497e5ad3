//! Transport abstraction for git wire protocol communication.
//!
//! This crate provides the physical byte layer underneath the smart
//! protocol: SSH (subprocess), HTTP/HTTPS (stateless smart protocol via
//! curl), `git://` (raw TCP), and local repositories (service
//! subprocess). Protocol framing lives in `gitkv-protocol`.

pub mod git;
pub mod http;
pub mod local;
pub mod ssh;
pub mod url;

use std::io::{Read, Write};

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP error: {status}: {message}")]
    Http { status: u16, message: String },

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Git URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ssh,
    Git,
    Http,
    Https,
    File,
    /// Local path without a scheme prefix.
    Local,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Scheme::Ssh => "ssh",
            Scheme::Git => "git",
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::File => "file",
            Scheme::Local => "local",
        })
    }
}

/// Parsed git URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    pub scheme: Scheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub path: String,
}

impl std::fmt::Display for GitUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scheme {
            Scheme::Local => write!(f, "{}", self.path),
            Scheme::File => write!(f, "file://{}", self.path),
            _ => {
                write!(f, "{}://", self.scheme)?;
                if let Some(ref user) = self.user {
                    write!(f, "{}@", user)?;
                }
                if let Some(ref host) = self.host {
                    write!(f, "{}", host)?;
                }
                if let Some(port) = self.port {
                    write!(f, ":{}", port)?;
                }
                write!(f, "{}", self.path)
            }
        }
    }
}

/// The two half-protocols of the smart protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// git-upload-pack (fetch side).
    UploadPack,
    /// git-receive-pack (push side).
    ReceivePack,
}

impl Service {
    /// Service name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }
}

/// Authentication material for credentialed endpoints.
///
/// Selection is independent of scheme; hosted forges accept basic auth
/// with a token as the password. Subprocess transports (ssh, local)
/// ignore these and rely on the ambient environment.
#[derive(Clone, Default)]
pub enum Credentials {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("Credentials::None"),
            Self::Basic { username, .. } => {
                write!(f, "Credentials::Basic {{ username: {username:?}, .. }}")
            }
            Self::Bearer(_) => f.write_str("Credentials::Bearer(..)"),
        }
    }
}

/// A bidirectional byte channel to a remote git service.
///
/// Stateful transports (ssh, git://, local) expose the live stream of a
/// single service invocation. Stateless transports (HTTP) buffer writes
/// and exchange them for a response on [`flush_request`](Transport::flush_request).
pub trait Transport: Send {
    /// Reader for the server's response.
    fn reader(&mut self) -> &mut dyn Read;

    /// Writer for sending data to the server.
    fn writer(&mut self) -> &mut dyn Write;

    /// Complete the pending request/response exchange.
    ///
    /// Stateful transports flush their writer; the stateless HTTP
    /// transport POSTs the buffered request and loads the response.
    /// Must be called after writing a full request and before reading
    /// its response.
    fn flush_request(&mut self) -> Result<(), TransportError>;

    /// Close the transport connection.
    fn close(self: Box<Self>) -> Result<(), TransportError>;

    /// Whether each request/response exchange is independent (HTTP).
    fn is_stateless(&self) -> bool {
        false
    }
}

/// Open a transport for the given URL and service.
pub fn connect(
    url: &GitUrl,
    service: Service,
    credentials: &Credentials,
) -> Result<Box<dyn Transport>, TransportError> {
    match url.scheme {
        Scheme::Ssh => ssh::connect(url, service),
        Scheme::Git => git::connect(url, service),
        Scheme::Http | Scheme::Https => http::connect(url, service, credentials),
        Scheme::File | Scheme::Local => local::connect(url, service),
    }
}
