//! Backend configuration.

use std::time::Duration;

use gitkv_transport::Credentials;

/// Committer identity used in generated commits.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "git-backed-rest".into(),
            email: "no-reply@gitkv.dev".into(),
        }
    }
}

/// Configuration for [`Backend::open`](crate::Backend::open).
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote repository URL (required).
    pub endpoint: String,
    pub credentials: Credentials,
    /// Funnel in-process writes through a serializer (default on).
    pub serialize_writes: bool,
    /// Object-store sweep cadence.
    pub sweep_period: Duration,
    /// Request `filter blob:none` on tip fetches where advertised.
    pub blob_filter_on_fetch: bool,
    /// Identity for generated commits.
    pub committer: Identity,
    /// Initial retry backoff interval.
    pub backoff_initial: Duration,
    /// Retry backoff ceiling.
    pub backoff_max: Duration,
    /// Handshake both services at construction time.
    pub warm_up: bool,
}

impl Config {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: Credentials::None,
            serialize_writes: true,
            sweep_period: Duration::from_secs(10),
            blob_filter_on_fetch: true,
            committer: Identity::default(),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            warm_up: true,
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn serialize_writes(mut self, on: bool) -> Self {
        self.serialize_writes = on;
        self
    }

    pub fn sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = period;
        self
    }

    pub fn blob_filter_on_fetch(mut self, on: bool) -> Self {
        self.blob_filter_on_fetch = on;
        self
    }

    pub fn committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer = Identity {
            name: name.into(),
            email: email.into(),
        };
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self
    }

    pub fn warm_up(mut self, on: bool) -> Self {
        self.warm_up = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::new("https://example.com/repo.git");
        assert!(config.serialize_writes);
        assert!(config.blob_filter_on_fetch);
        assert!(config.warm_up);
        assert_eq!(config.sweep_period, Duration::from_secs(10));
        assert_eq!(config.backoff_initial, Duration::from_millis(500));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
        assert_eq!(config.committer.name, "git-backed-rest");
    }

    #[test]
    fn builder_overrides() {
        let config = Config::new("/srv/repo.git")
            .serialize_writes(false)
            .sweep_period(Duration::from_secs(60))
            .committer("robot", "robot@example.com")
            .backoff(Duration::from_millis(10), Duration::from_millis(100))
            .warm_up(false);
        assert!(!config.serialize_writes);
        assert_eq!(config.committer.email, "robot@example.com");
        assert_eq!(config.backoff_initial, Duration::from_millis(10));
        assert!(!config.warm_up);
    }
}
