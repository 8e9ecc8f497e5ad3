//! Git URL parsing.
//!
//! Supported forms:
//! - `ssh://[user@]host[:port]/path`
//! - `git://host[:port]/path`
//! - `http[s]://[user@]host[:port]/path`
//! - `file:///path`
//! - `/local/path` or `./local/path`
//! - `user@host:path` (SCP-like SSH)

use crate::{GitUrl, Scheme, TransportError};

impl GitUrl {
    /// Parse a git URL string.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TransportError::InvalidUrl("empty URL".into()));
        }

        if let Some(rest) = url.strip_prefix("ssh://") {
            return parse_standard(Scheme::Ssh, rest);
        }
        if let Some(rest) = url.strip_prefix("git://") {
            return parse_standard(Scheme::Git, rest);
        }
        if let Some(rest) = url.strip_prefix("http://") {
            return parse_standard(Scheme::Http, rest);
        }
        if let Some(rest) = url.strip_prefix("https://") {
            return parse_standard(Scheme::Https, rest);
        }
        if let Some(rest) = url.strip_prefix("file://") {
            return Ok(GitUrl {
                scheme: Scheme::File,
                host: None,
                port: None,
                user: None,
                path: rest.to_string(),
            });
        }

        // Anything that names a scheme we did not match above is unknown,
        // not a local path.
        if let Some(scheme_end) = url.find("://") {
            return Err(TransportError::UnsupportedScheme(
                url[..scheme_end].to_string(),
            ));
        }

        // Absolute or relative local paths.
        if url.starts_with('/') || url.starts_with('.') {
            return Ok(GitUrl {
                scheme: Scheme::Local,
                host: None,
                port: None,
                user: None,
                path: url.to_string(),
            });
        }

        // SCP-like syntax: [user@]host:path
        if let Some(colon_pos) = url.find(':') {
            let host_part = &url[..colon_pos];
            let path = &url[colon_pos + 1..];

            let (user, host) = match host_part.find('@') {
                Some(at_pos) => (
                    Some(host_part[..at_pos].to_string()),
                    host_part[at_pos + 1..].to_string(),
                ),
                None => (None, host_part.to_string()),
            };

            if host.is_empty() {
                return Err(TransportError::InvalidUrl(format!(
                    "empty host in SCP-like URL: {url}"
                )));
            }

            return Ok(GitUrl {
                scheme: Scheme::Ssh,
                host: Some(host),
                port: None,
                user,
                path: path.to_string(),
            });
        }

        Err(TransportError::InvalidUrl(format!(
            "could not parse URL: {url}"
        )))
    }
}

/// Parse `[user@]host[:port]/path` after the scheme was stripped.
fn parse_standard(scheme: Scheme, rest: &str) -> Result<GitUrl, TransportError> {
    let (authority, path) = match rest.find('/') {
        Some(slash_pos) => (&rest[..slash_pos], &rest[slash_pos..]),
        None => (rest, "/"),
    };

    let (user, host_port) = match authority.find('@') {
        Some(at_pos) => (
            Some(authority[..at_pos].to_string()),
            &authority[at_pos + 1..],
        ),
        None => (None, authority),
    };

    let (host, port) = match host_port.rfind(':') {
        Some(colon_pos) => {
            let port_str = &host_port[colon_pos + 1..];
            let port: u16 = port_str.parse().map_err(|_| {
                TransportError::InvalidUrl(format!("invalid port: {port_str}"))
            })?;
            (&host_port[..colon_pos], Some(port))
        }
        None => (host_port, None),
    };

    if host.is_empty() {
        return Err(TransportError::InvalidUrl(format!(
            "missing host in {scheme} URL"
        )));
    }

    Ok(GitUrl {
        scheme,
        host: Some(host.to_string()),
        port,
        user,
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_https() {
        let url = GitUrl::parse("https://github.com/org/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Https);
        assert_eq!(url.host.as_deref(), Some("github.com"));
        assert_eq!(url.path, "/org/repo.git");
        assert_eq!(url.port, None);
    }

    #[test]
    fn parse_http_with_port() {
        let url = GitUrl::parse("http://localhost:8080/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Http);
        assert_eq!(url.port, Some(8080));
        assert_eq!(url.path, "/repo.git");
    }

    #[test]
    fn parse_ssh_with_user() {
        let url = GitUrl::parse("ssh://git@example.com/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Ssh);
        assert_eq!(url.user.as_deref(), Some("git"));
        assert_eq!(url.host.as_deref(), Some("example.com"));
    }

    #[test]
    fn parse_scp_like() {
        let url = GitUrl::parse("git@github.com:org/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Ssh);
        assert_eq!(url.user.as_deref(), Some("git"));
        assert_eq!(url.host.as_deref(), Some("github.com"));
        assert_eq!(url.path, "org/repo.git");
    }

    #[test]
    fn parse_git_daemon() {
        let url = GitUrl::parse("git://example.com/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Git);
    }

    #[test]
    fn parse_file_url() {
        let url = GitUrl::parse("file:///srv/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::File);
        assert_eq!(url.path, "/srv/repo.git");
    }

    #[test]
    fn parse_local_paths() {
        assert_eq!(GitUrl::parse("/srv/repo.git").unwrap().scheme, Scheme::Local);
        assert_eq!(GitUrl::parse("./repo.git").unwrap().scheme, Scheme::Local);
    }

    #[test]
    fn unknown_scheme_rejected() {
        assert!(matches!(
            GitUrl::parse("ftp://example.com/repo.git"),
            Err(TransportError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn empty_url_rejected() {
        assert!(GitUrl::parse("").is_err());
        assert!(GitUrl::parse("   ").is_err());
    }

    #[test]
    fn invalid_port_rejected() {
        assert!(GitUrl::parse("http://host:notaport/x").is_err());
    }

    #[test]
    fn display_roundtrip() {
        for s in [
            "https://example.com/org/repo.git",
            "git://example.com/repo.git",
            "ssh://git@example.com/repo.git",
            "/srv/repo.git",
        ] {
            assert_eq!(GitUrl::parse(s).unwrap().to_string(), s);
        }
    }
}
