//! Anonymous `git://` transport over raw TCP.
//!
//! The git daemon expects a single pkt-line request naming the service,
//! the repository path, and the host, then speaks the chosen service
//! protocol on the same stream.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::{GitUrl, Service, Transport, TransportError};

/// Default git daemon port.
pub const GIT_DAEMON_PORT: u16 = 9418;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP transport to a git daemon.
pub struct GitDaemonTransport {
    read: TcpStream,
    write: TcpStream,
}

impl Transport for GitDaemonTransport {
    fn reader(&mut self) -> &mut dyn Read {
        &mut self.read
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.write
    }

    fn flush_request(&mut self) -> Result<(), TransportError> {
        self.write.flush()?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), TransportError> {
        let _ = self.write.shutdown(std::net::Shutdown::Write);
        Ok(())
    }
}

/// Connect to a git daemon and send the service request.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    let host = url
        .host
        .as_deref()
        .ok_or_else(|| TransportError::InvalidUrl("git:// URL requires a host".into()))?;
    let port = url.port.unwrap_or(GIT_DAEMON_PORT);

    tracing::debug!(service = service.as_str(), host, port, "connecting to git daemon");

    let addr = (host, port);
    let mut stream = std::net::TcpStream::connect(addr)
        .map_err(|e| TransportError::ConnectionFailed(format!("{host}:{port}: {e}")))?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;

    // Request line: "git-upload-pack /path\0host=example.com\0"
    let payload = format!("{} {}\0host={}\0", service.as_str(), url.path, host);
    let mut request = format!("{:04x}", payload.len() + 4).into_bytes();
    request.extend_from_slice(payload.as_bytes());
    stream.write_all(&request)?;

    let read = stream
        .try_clone()
        .map_err(|e| TransportError::ConnectionFailed(format!("cloning stream: {e}")))?;

    Ok(Box::new(GitDaemonTransport {
        read,
        write: stream,
    }))
}
