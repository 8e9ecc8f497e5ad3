//! HTTP/HTTPS smart transport.
//!
//! The smart HTTP protocol is stateless: ref discovery is a GET to
//! `/info/refs?service=...`, and each protocol exchange is a POST to
//! the service endpoint. Requests are driven through a curl subprocess;
//! writes are buffered until `flush_request` performs the POST.

use std::io::{Cursor, Read, Write};
use std::process::{Command, Stdio};

use crate::{Credentials, GitUrl, Service, Transport, TransportError};

/// HTTP transport state.
pub struct HttpTransport {
    /// Base repository URL (no trailing slash).
    base_url: String,
    service: Service,
    credentials: Credentials,
    /// Data buffered for the next POST.
    write_buf: Vec<u8>,
    /// Response body of the last exchange.
    read_buf: Cursor<Vec<u8>>,
}

impl HttpTransport {
    /// GET `/info/refs?service=...` — the ref advertisement.
    fn discover_refs(&mut self) -> Result<(), TransportError> {
        let url = format!("{}/info/refs?service={}", self.base_url, self.service.as_str());
        tracing::debug!(%url, "http ref discovery");
        let body = run_curl(&url, &self.credentials, None, &[])?;
        self.read_buf = Cursor::new(body);
        Ok(())
    }

    /// POST the buffered request to the service endpoint.
    fn post_request(&mut self) -> Result<(), TransportError> {
        let url = format!("{}/{}", self.base_url, self.service.as_str());
        let content_type = format!("Content-Type: application/x-{}-request", self.service.as_str());
        let accept = format!("Accept: application/x-{}-result", self.service.as_str());

        let request = std::mem::take(&mut self.write_buf);
        tracing::debug!(%url, bytes = request.len(), "http service exchange");
        let body = run_curl(&url, &self.credentials, Some(&request), &[&content_type, &accept])?;
        self.read_buf = Cursor::new(body);
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn reader(&mut self) -> &mut dyn Read {
        &mut self.read_buf
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.write_buf
    }

    fn flush_request(&mut self) -> Result<(), TransportError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.post_request()
    }

    fn close(self: Box<Self>) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_stateless(&self) -> bool {
        true
    }
}

/// Connect over HTTP/HTTPS; performs the initial ref discovery.
pub fn connect(
    url: &GitUrl,
    service: Service,
    credentials: &Credentials,
) -> Result<Box<dyn Transport>, TransportError> {
    let base_url = format!(
        "{}://{}{}{}",
        url.scheme,
        url.host.as_deref().unwrap_or(""),
        url.port.map(|p| format!(":{p}")).unwrap_or_default(),
        url.path.trim_end_matches('/'),
    );

    let mut transport = HttpTransport {
        base_url,
        service,
        credentials: credentials.clone(),
        write_buf: Vec::new(),
        read_buf: Cursor::new(Vec::new()),
    };

    transport.discover_refs()?;
    Ok(Box::new(transport))
}

/// Run one curl request and return the response body.
///
/// `--include` keeps the response headers so the status code can be
/// checked; redirects are followed and intermediate header blocks are
/// skipped.
fn run_curl(
    url: &str,
    credentials: &Credentials,
    body: Option<&[u8]>,
    extra_headers: &[&str],
) -> Result<Vec<u8>, TransportError> {
    let mut cmd = Command::new("curl");
    cmd.args(["-sL", "--include"]);

    match credentials {
        Credentials::None => {}
        Credentials::Basic { username, password } => {
            cmd.arg("-u").arg(format!("{username}:{password}"));
        }
        Credentials::Bearer(token) => {
            cmd.arg("-H").arg(format!("Authorization: Bearer {token}"));
        }
    }

    for header in extra_headers {
        cmd.arg("-H").arg(header);
    }

    if body.is_some() {
        cmd.args(["-X", "POST", "--data-binary", "@-"]);
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    cmd.arg(url);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| TransportError::ConnectionFailed(format!("failed to spawn curl: {e}")))?;

    if let (Some(data), Some(stdin)) = (body, child.stdin.as_mut()) {
        stdin.write_all(data)?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError::ConnectionFailed(format!(
            "curl exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    parse_http_response(&output.stdout)
}

/// Split headers from body and enforce a successful status.
///
/// With `-L --include`, curl emits one header block per hop; only the
/// final block's status matters.
fn parse_http_response(response: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut rest = response;
    loop {
        if !rest.starts_with(b"HTTP/") {
            // No header block: treat the remainder as the body.
            return Ok(rest.to_vec());
        }

        let status = parse_status_line(rest)?;
        let body_start = find_header_end(rest).ok_or_else(|| TransportError::Http {
            status,
            message: "truncated HTTP response".into(),
        })?;
        let body = &rest[body_start..];

        // Informational and redirect statuses are followed by another
        // header block from curl.
        if (100..200).contains(&status) || (300..400).contains(&status) {
            rest = body;
            continue;
        }

        if status >= 400 {
            return Err(TransportError::Http {
                status,
                message: status_text(status).to_string(),
            });
        }

        return Ok(body.to_vec());
    }
}

fn parse_status_line(data: &[u8]) -> Result<u16, TransportError> {
    let line_end = data
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(data.len());
    let line = String::from_utf8_lossy(&data[..line_end]);
    line.split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TransportError::ConnectionFailed(format!("bad status line: {line}")))
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
        .or_else(|| data.windows(2).position(|w| w == b"\n\n").map(|p| p + 2))
}

fn status_text(status: u16) -> &'static str {
    match status {
        401 => "authentication required",
        403 => "access forbidden",
        404 => "repository not found",
        _ => "HTTP request failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nbody bytes";
        assert_eq!(parse_http_response(raw).unwrap(), b"body bytes");
    }

    #[test]
    fn parse_redirect_then_ok() {
        let raw = b"HTTP/1.1 301 Moved\r\nLocation: x\r\n\r\nHTTP/1.1 200 OK\r\n\r\nfinal";
        assert_eq!(parse_http_response(raw).unwrap(), b"final");
    }

    #[test]
    fn unauthorized_surfaces_status() {
        let raw = b"HTTP/1.1 401 Unauthorized\r\n\r\n";
        assert!(matches!(
            parse_http_response(raw),
            Err(TransportError::Http { status: 401, .. })
        ));
    }

    #[test]
    fn forbidden_surfaces_status() {
        let raw = b"HTTP/1.1 403 Forbidden\r\n\r\nnope";
        assert!(matches!(
            parse_http_response(raw),
            Err(TransportError::Http { status: 403, .. })
        ));
    }

    #[test]
    fn headerless_body_passes_through() {
        assert_eq!(parse_http_response(b"raw").unwrap(), b"raw");
    }

    #[test]
    fn binary_body_preserved() {
        let mut raw = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0u8, 1, 2, 0xff]);
        assert_eq!(parse_http_response(&raw).unwrap(), &[0u8, 1, 2, 0xff]);
    }
}
