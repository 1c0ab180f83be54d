//! Health reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message reported while the liveness verdict is down.
pub const CONNECTION_DOWN_MESSAGE: &str = "storage connection is down";

/// Overall status of the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// Started and storage is reachable.
    Running,
    /// Storage is unreachable, or the reader is not started.
    ConnectionFailure,
}

impl HealthStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Running => "RUNNING",
            HealthStatus::ConnectionFailure => "CONNECTION_FAILURE",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status plus a human-readable diagnostic. The message is empty when
/// healthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Diagnostic message.
    pub message: String,
}

impl HealthReport {
    /// A healthy report.
    pub fn running() -> Self {
        Self {
            status: HealthStatus::Running,
            message: String::new(),
        }
    }

    /// An unhealthy report.
    pub fn connection_failure(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::ConnectionFailure,
            message: message.into(),
        }
    }

    /// Returns true if the status is [`HealthStatus::Running`].
    pub fn is_running(&self) -> bool {
        self.status == HealthStatus::Running
    }
}
