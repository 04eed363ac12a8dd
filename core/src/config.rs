//! Client configuration and API credentials.

use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://api.scribd.com/api";
pub const API_KEY_VAR: &str = "SCRIBD_API_KEY";
pub const API_SECRET_VAR: &str = "SCRIBD_API_SECRET";

/// Retry budget for transport-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(20),
        }
    }
}

/// Where and how requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub endpoint: String,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            read_timeout: Duration::from_secs(15 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// API key and shared secret. Both must be present before a request is signed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub key: Option<String>,
    pub secret: Option<String>,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            secret: Some(secret.into()),
        }
    }

    /// Reads `SCRIBD_API_KEY` and `SCRIBD_API_SECRET`. Empty values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            key: read(API_KEY_VAR),
            secret: read(API_SECRET_VAR),
        }
    }

    /// Key and secret, if both are set.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (&self.key, &self.secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}
