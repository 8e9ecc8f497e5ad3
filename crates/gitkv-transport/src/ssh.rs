//! SSH transport: spawns an ssh process running the remote service.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};

use crate::{GitUrl, Service, Transport, TransportError};

/// SSH transport over an external ssh process.
pub struct SshTransport {
    child: Child,
}

impl Transport for SshTransport {
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
            // ssh exits non-zero for reasons that are not git errors
            // (e.g. the remote closing the connection after a completed
            // push). Only the hard failure codes are surfaced.
            let code = status.code().unwrap_or(-1);
            if code == 128 || code == 255 {
                return Err(TransportError::Ssh(format!(
                    "ssh process exited with code {code}"
                )));
            }
        }
        Ok(())
    }
}

/// Resolve the ssh command: `GIT_SSH_COMMAND`, then `GIT_SSH`, then "ssh".
fn resolve_ssh_command() -> String {
    std::env::var("GIT_SSH_COMMAND")
        .or_else(|_| std::env::var("GIT_SSH"))
        .unwrap_or_else(|_| "ssh".to_string())
}

/// Connect to a remote repository over SSH.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    let host = url
        .host
        .as_deref()
        .ok_or_else(|| TransportError::InvalidUrl("SSH URL requires a host".into()))?;

    let ssh_cmd = resolve_ssh_command();
    let mut cmd = Command::new(&ssh_cmd);

    if let Some(port) = url.port {
        cmd.arg("-p").arg(port.to_string());
    }

    match url.user {
        Some(ref user) => cmd.arg(format!("{user}@{host}")),
        None => cmd.arg(host),
    };

    cmd.arg(service.as_str());
    cmd.arg(&url.path);

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::debug!(service = service.as_str(), host, "spawning ssh transport");

    let child = cmd
        .spawn()
        .map_err(|e| TransportError::Ssh(format!("failed to spawn {ssh_cmd}: {e}")))?;

    Ok(Box::new(SshTransport { child }))
}
