//! Capability parsing and negotiation.
//!
//! In protocol v0/v1 the server advertises capabilities after a NUL on
//! the first ref line. The engine consults a handful of them: `filter`
//! for blob-less fetches, `report-status` and `atomic` for push, and
//! the sideband pair for demultiplexing.

/// Agent string sent with every negotiation.
pub const AGENT: &str = "agent=gitkv/0.1";

/// Parsed set of server capabilities.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: Vec<(String, Option<String>)>,
}

impl Capabilities {
    /// Parse a space-separated capability string.
    pub fn parse(caps_str: &str) -> Self {
        let mut entries = Vec::new();
        for cap in caps_str.split_whitespace() {
            match cap.find('=') {
                Some(eq) => entries.push((cap[..eq].to_string(), Some(cap[eq + 1..].to_string()))),
                None => entries.push((cap.to_string(), None)),
            }
        }
        Self { entries }
    }

    /// Whether a capability was advertised.
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Value of a `name=value` capability.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sideband mode negotiated for pack transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebandMode {
    None,
    /// side-band (1000-byte packets).
    Band,
    /// side-band-64k.
    Band64k,
}

/// Pick the best sideband mode the server offers.
pub fn select_sideband(caps: &Capabilities) -> SidebandMode {
    if caps.has("side-band-64k") {
        SidebandMode::Band64k
    } else if caps.has("side-band") {
        SidebandMode::Band
    } else {
        SidebandMode::None
    }
}

/// Client capabilities for a fetch request.
///
/// multi_ack and no-done are deliberately not negotiated; the simple
/// ACK/NAK exchange is all the engine needs.
pub fn negotiate_fetch(server: &Capabilities, filter_blobs: bool) -> Vec<String> {
    let mut client = Vec::new();
    match select_sideband(server) {
        SidebandMode::Band64k => client.push("side-band-64k".into()),
        SidebandMode::Band => client.push("side-band".into()),
        SidebandMode::None => {}
    }
    if filter_blobs && server.has("filter") {
        client.push("filter".into());
    }
    client.push(AGENT.into());
    client
}

/// Client capabilities for a push request.
pub fn negotiate_push(server: &Capabilities, atomic: bool) -> Vec<String> {
    let mut client = Vec::new();
    if server.has("report-status") {
        client.push("report-status".into());
    }
    if atomic && server.has("atomic") {
        client.push("atomic".into());
    }
    if server.has("side-band-64k") {
        client.push("side-band-64k".into());
    }
    client.push(AGENT.into());
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_capability_string() {
        let caps = Capabilities::parse(
            "multi_ack thin-pack side-band side-band-64k ofs-delta filter \
             symref=HEAD:refs/heads/main agent=git/2.39.0",
        );
        assert!(caps.has("multi_ack"));
        assert!(caps.has("filter"));
        assert_eq!(caps.get("symref"), Some("HEAD:refs/heads/main"));
        assert_eq!(caps.get("agent"), Some("git/2.39.0"));
        assert!(!caps.has("absent"));
    }

    #[test]
    fn empty_capabilities() {
        let caps = Capabilities::parse("");
        assert!(caps.is_empty());
        assert!(!caps.has("anything"));
    }

    #[test]
    fn sideband_prefers_64k() {
        let caps = Capabilities::parse("side-band side-band-64k");
        assert_eq!(select_sideband(&caps), SidebandMode::Band64k);
    }

    #[test]
    fn sideband_falls_back() {
        assert_eq!(
            select_sideband(&Capabilities::parse("side-band")),
            SidebandMode::Band
        );
        assert_eq!(
            select_sideband(&Capabilities::parse("thin-pack")),
            SidebandMode::None
        );
    }

    #[test]
    fn fetch_negotiation_requests_filter_only_when_offered() {
        let with = Capabilities::parse("side-band-64k filter");
        let caps = negotiate_fetch(&with, true);
        assert!(caps.contains(&"filter".to_string()));
        assert!(caps.contains(&"side-band-64k".to_string()));

        let without = Capabilities::parse("side-band-64k");
        let caps = negotiate_fetch(&without, true);
        assert!(!caps.contains(&"filter".to_string()));

        let disabled = negotiate_fetch(&with, false);
        assert!(!disabled.contains(&"filter".to_string()));
    }

    #[test]
    fn fetch_negotiation_skips_multi_ack() {
        let server = Capabilities::parse("multi_ack_detailed no-done side-band-64k");
        let caps = negotiate_fetch(&server, false);
        assert!(!caps.iter().any(|c| c.starts_with("multi_ack")));
        assert!(!caps.contains(&"no-done".to_string()));
    }

    #[test]
    fn push_negotiation() {
        let server = Capabilities::parse("report-status delete-refs atomic side-band-64k");
        let caps = negotiate_push(&server, true);
        assert!(caps.contains(&"report-status".to_string()));
        assert!(caps.contains(&"atomic".to_string()));

        let non_atomic = negotiate_push(&server, false);
        assert!(!non_atomic.contains(&"atomic".to_string()));
    }

    #[test]
    fn agent_always_sent() {
        assert!(negotiate_fetch(&Capabilities::default(), false).contains(&AGENT.to_string()));
        assert!(negotiate_push(&Capabilities::default(), true).contains(&AGENT.to_string()));
    }
}
