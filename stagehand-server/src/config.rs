//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_wire::ListenAddr;

pub use stagehand_wire::DEFAULT_PORT;

/// Minimum seconds between detector ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;
/// Bounded wait for one tool invocation, in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: f64 = 10.0;
/// Queued notifications per connection; further updates to a connection
/// whose queue is full are dropped.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

/// Configuration for [`Server`](crate::Server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Transport selector: `port:<N>` for loopback TCP, anything else is a
    /// Unix socket path.
    pub listen: ListenAddr,
    /// Minimum seconds between detector ticks.
    pub poll_interval_secs: f64,
    /// Bounded wait for one tool invocation, in seconds. The invocation is
    /// abandoned, not cancelled, when it expires.
    pub call_timeout_secs: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenAddr::Port(DEFAULT_PORT),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn poll_interval(&self) -> Duration {
        duration_from_secs(self.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS)
    }

    pub fn call_timeout(&self) -> Duration {
        duration_from_secs(self.call_timeout_secs, DEFAULT_CALL_TIMEOUT_SECS)
    }
}

/// Convert a config float to a Duration, falling back to the default when
/// the value is negative or non-finite.
pub(crate) fn duration_from_secs(secs: f64, default_secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs_f64(default_secs))
}
