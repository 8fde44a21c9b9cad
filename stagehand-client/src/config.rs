//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_wire::ListenAddr;

pub use stagehand_wire::DEFAULT_PORT;

/// Connection attempts made before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Base delay between connection attempts, in seconds. The wait grows
/// linearly: attempt `n` sleeps `n` times this long before the next try.
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 0.5;
/// Bounded wait for one response, in seconds.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: f64 = 10.0;

/// Configuration for [`Client`](crate::Client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the server listens: `port:<N>` for loopback TCP, anything else
    /// is a Unix socket path.
    pub addr: ListenAddr,
    /// Connection attempts made before giving up. At least one attempt is
    /// always made, so 0 behaves like 1.
    pub max_retries: u32,
    /// Base delay between connection attempts, in seconds.
    pub retry_delay_secs: f64,
    /// Bounded wait for one response, in seconds.
    pub response_timeout_secs: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: ListenAddr::Port(DEFAULT_PORT),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given address.
    pub fn new(addr: ListenAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        duration_from_secs(self.retry_delay_secs, DEFAULT_RETRY_DELAY_SECS)
    }

    pub fn response_timeout(&self) -> Duration {
        duration_from_secs(self.response_timeout_secs, DEFAULT_RESPONSE_TIMEOUT_SECS)
    }
}

/// Convert a config float to a Duration, falling back to the default when
/// the value is negative or non-finite.
fn duration_from_secs(secs: f64, default_secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs_f64(default_secs))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.addr, ListenAddr::Port(DEFAULT_PORT));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_millis(500));
        assert_eq!(config.response_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let config = ClientConfig {
            max_retries: 0,
            ..ClientConfig::default()
        };
        assert_eq!(config.attempts(), 1);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"addr": "port:5000", "max_retries": 5}"#).unwrap();
        assert_eq!(config.addr, ListenAddr::Port(5000));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.response_timeout_secs, DEFAULT_RESPONSE_TIMEOUT_SECS);
    }

    #[test]
    fn test_negative_delay_falls_back_to_default() {
        let config = ClientConfig {
            retry_delay_secs: -1.0,
            ..ClientConfig::default()
        };
        assert_eq!(config.retry_delay(), Duration::from_millis(500));
    }
}
