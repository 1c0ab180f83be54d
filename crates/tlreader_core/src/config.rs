//! Reader configuration.

use crate::error::{ReaderError, ReaderResult};
use std::time::Duration;
use tlreader_storage::ConnectionConfig;

/// Option key: cluster the reader serves.
pub const CLUSTER_ID_KEY: &str = "timeline.reader.cluster-id";
/// Option key: storage endpoint.
pub const STORAGE_ENDPOINT_KEY: &str = "timeline.reader.storage.endpoint";
/// Option key: RPC timeout of the main connection.
pub const STORAGE_RPC_TIMEOUT_KEY: &str = "timeline.reader.storage.rpc-timeout-ms";
/// Option key: scanner timeout of the main connection.
pub const STORAGE_SCANNER_TIMEOUT_KEY: &str = "timeline.reader.storage.scanner-timeout-ms";
/// Option key: retries of the main connection.
pub const STORAGE_RETRIES_KEY: &str = "timeline.reader.storage.retries";
/// Option key: liveness monitor interval.
pub const MONITOR_INTERVAL_KEY: &str = "timeline.reader.storage-monitor.interval-ms";
/// Option key: probe RPC timeout.
pub const PROBE_TIMEOUT_KEY: &str = "timeline.reader.storage-monitor.probe-timeout-ms";
/// Option key: probe retries.
pub const PROBE_RETRIES_KEY: &str = "timeline.reader.storage-monitor.probe-retries";
/// Option key: probe scanner timeout.
pub const PROBE_SCANNER_TIMEOUT_KEY: &str =
    "timeline.reader.storage-monitor.probe-scanner-timeout-ms";

/// Default cluster id.
pub const DEFAULT_CLUSTER_ID: &str = "yarn-cluster";
/// Default liveness monitor interval.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);
/// Default probe retries.
pub const DEFAULT_PROBE_RETRIES: u32 = 3;
/// Pause between probe retries.
pub const PROBE_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Configuration for a [`crate::TimelineReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Cluster the reader serves; also scopes the liveness probe.
    pub cluster_id: String,
    /// Connection profile for foreground reads.
    pub storage: ConnectionConfig,
    /// How often the liveness probe runs.
    pub monitor_interval: Duration,
    /// Probe RPC timeout. Defaults to the monitor interval.
    pub probe_timeout: Option<Duration>,
    /// Probe scanner timeout. Defaults to the monitor interval.
    pub probe_scanner_timeout: Option<Duration>,
    /// Client-side retries on the probe connection.
    pub probe_retries: u32,
}

impl ReaderConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from opaque key/value options.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidConfig`] if a known key carries a value
    /// that does not parse, or the monitor interval is zero.
    pub fn from_options<I, K, V>(options: I) -> ReaderResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            let value = value.as_ref().trim();
            match key.as_ref() {
                CLUSTER_ID_KEY => config.cluster_id = value.to_string(),
                STORAGE_ENDPOINT_KEY => config.storage.endpoint = value.to_string(),
                STORAGE_RPC_TIMEOUT_KEY => {
                    config.storage.rpc_timeout = parse_millis(STORAGE_RPC_TIMEOUT_KEY, value)?
                }
                STORAGE_SCANNER_TIMEOUT_KEY => {
                    config.storage.scanner_timeout =
                        parse_millis(STORAGE_SCANNER_TIMEOUT_KEY, value)?
                }
                STORAGE_RETRIES_KEY => {
                    config.storage.retries = parse_u32(STORAGE_RETRIES_KEY, value)?
                }
                MONITOR_INTERVAL_KEY => {
                    config.monitor_interval = parse_millis(MONITOR_INTERVAL_KEY, value)?
                }
                PROBE_TIMEOUT_KEY => {
                    config.probe_timeout = Some(parse_millis(PROBE_TIMEOUT_KEY, value)?)
                }
                PROBE_SCANNER_TIMEOUT_KEY => {
                    config.probe_scanner_timeout =
                        Some(parse_millis(PROBE_SCANNER_TIMEOUT_KEY, value)?)
                }
                PROBE_RETRIES_KEY => config.probe_retries = parse_u32(PROBE_RETRIES_KEY, value)?,
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidConfig`] for an empty cluster id or a
    /// zero monitor interval.
    pub fn validate(&self) -> ReaderResult<()> {
        if self.cluster_id.is_empty() {
            return Err(ReaderError::InvalidConfig("cluster id is empty".into()));
        }
        if self.monitor_interval.is_zero() {
            return Err(ReaderError::InvalidConfig(
                "monitor interval must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Sets the cluster id.
    #[must_use]
    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    /// Sets the main connection profile.
    #[must_use]
    pub fn with_storage(mut self, storage: ConnectionConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the monitor interval.
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Sets the probe RPC timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Sets the probe scanner timeout.
    #[must_use]
    pub fn with_probe_scanner_timeout(mut self, timeout: Duration) -> Self {
        self.probe_scanner_timeout = Some(timeout);
        self
    }

    /// Sets the probe retry count.
    #[must_use]
    pub fn with_probe_retries(mut self, retries: u32) -> Self {
        self.probe_retries = retries;
        self
    }

    /// Connection profile for the dedicated probe connection.
    ///
    /// Same endpoint as the main connection, with timeouts bounded by the
    /// monitor interval and few retries so a dead backend cannot stall the
    /// next probe.
    pub fn probe_connection_config(&self) -> ConnectionConfig {
        self.storage
            .clone()
            .with_rpc_timeout(self.probe_timeout.unwrap_or(self.monitor_interval))
            .with_scanner_timeout(self.probe_scanner_timeout.unwrap_or(self.monitor_interval))
            .with_retries(self.probe_retries)
            .with_retry_pause(PROBE_RETRY_PAUSE)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cluster_id: DEFAULT_CLUSTER_ID.to_string(),
            storage: ConnectionConfig::default(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            probe_timeout: None,
            probe_scanner_timeout: None,
            probe_retries: DEFAULT_PROBE_RETRIES,
        }
    }
}

fn parse_millis(key: &str, value: &str) -> ReaderResult<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ReaderError::InvalidConfig(format!("{key}={value}: {e}")))
}

fn parse_u32(key: &str, value: &str) -> ReaderResult<u32> {
    value
        .parse::<u32>()
        .map_err(|e| ReaderError::InvalidConfig(format!("{key}={value}: {e}")))
}
