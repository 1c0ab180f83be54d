//! Connection configuration.

use std::time::Duration;

/// Configuration used when opening a storage connection.
///
/// The reader opens two connections with different profiles: one for
/// foreground reads and one, with tighter timeouts and fewer retries, for
/// the liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Backend endpoint (quorum string, URL, or `memory://`).
    pub endpoint: String,
    /// Timeout for a single RPC (`get`, or one scanner round trip).
    pub rpc_timeout: Duration,
    /// Timeout for a whole scan.
    pub scanner_timeout: Duration,
    /// Number of client-side retries before an operation fails.
    pub retries: u32,
    /// Pause between client-side retries.
    pub retry_pause: Duration,
}

impl ConnectionConfig {
    /// Creates a configuration for the given endpoint with default timeouts.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            rpc_timeout: Duration::from_secs(60),
            scanner_timeout: Duration::from_secs(60),
            retries: 15,
            retry_pause: Duration::from_millis(100),
        }
    }

    /// Sets the RPC timeout.
    #[must_use]
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets the scanner timeout.
    #[must_use]
    pub fn with_scanner_timeout(mut self, timeout: Duration) -> Self {
        self.scanner_timeout = timeout;
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the pause between retries.
    #[must_use]
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Worst-case time a single RPC can take including all retries.
    pub fn max_rpc_duration(&self) -> Duration {
        let attempts = self.retries.saturating_add(1);
        self.rpc_timeout
            .saturating_mul(attempts)
            .saturating_add(self.retry_pause.saturating_mul(self.retries))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("memory://")
    }
}
