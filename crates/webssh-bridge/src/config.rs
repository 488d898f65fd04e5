//! Bridge timing.

use std::time::Duration;

use serde::Deserialize;

/// Timing parameters of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How often buffered remote output is sent to the client.
    pub flush_interval_ms: u64,
    /// How often a transport ping is sent; 0 disables keepalives.
    pub keepalive_interval_secs: u64,
    /// Upper bound on a single remote write or transport send.
    pub write_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 12,
            keepalive_interval_secs: 30,
            write_timeout_ms: 10_000,
        }
    }
}

impl BridgeConfig {
    /// Flush tick period (at least 1 ms).
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// Keepalive period, if enabled.
    #[must_use]
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_secs > 0).then(|| Duration::from_secs(self.keepalive_interval_secs))
    }

    /// Bound on a single remote write or transport send (at least 1 ms).
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}
