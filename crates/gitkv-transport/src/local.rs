//! Local transport: spawns git-upload-pack / git-receive-pack directly
//! for `file://` and bare-path URLs.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};

use crate::{GitUrl, Service, Transport, TransportError};

/// Local transport over a service subprocess.
pub struct LocalTransport {
    child: Child,
}

impl Transport for LocalTransport {
    fn reader(&mut self) -> &mut dyn Read {
        self.child.stdout.as_mut().expect("stdout not captured")
    }

    fn writer(&mut self) -> &mut dyn Write {
        self.child.stdin.as_mut().expect("stdin not captured")
    }

    fn flush_request(&mut self) -> Result<(), TransportError> {
        if let Some(stdin) = self.child.stdin.as_mut() {
            stdin.flush()?;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), TransportError> {
        drop(self.child.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(TransportError::ConnectionFailed(format!(
                "service process exited with code {}",
                status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }
}

/// Spawn the service against a local repository.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    tracing::debug!(service = service.as_str(), path = %url.path, "spawning local service");

    let child = Command::new(service.as_str())
        .arg(&url.path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to spawn {}: {}",
                service.as_str(),
                e
            ))
        })?;

    Ok(Box::new(LocalTransport { child }))
}
