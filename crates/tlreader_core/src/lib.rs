//! # tlreader core
//!
//! Liveness-gated read service over a columnar timeline store.
//!
//! This crate provides:
//! - A [`LivenessMonitor`] that probes storage on a dedicated thread and
//!   caches an up/down verdict
//! - A [`ReaderDispatcher`] routing the three read shapes to pluggable
//!   reader strategies
//! - Table-backed strategies over the row-key layout in [`schema`]
//! - The [`TimelineReader`] facade with lifecycle, gating and health status
//!
//! ## Architecture
//!
//! ```text
//! TimelineReader ── gate ──> LivenessMonitor (atomic verdict)
//!       │                          │
//!       │ dispatch                 │ probe thread
//!       v                          v
//! ReaderDispatcher           TableProbe ── probe connection
//!       │
//!       v
//! ReaderFactory ── strategy ──> main connection
//! ```
//!
//! ## Key Invariants
//!
//! - A read is rejected without storage I/O while the verdict is down
//! - At most one probe runs at a time and missed ticks are skipped
//! - The probe uses its own connection with tighter timeouts
//! - Health reporting never fails
//! - `stop` releases the probe connection before the main connection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod dispatcher;
mod entity;
mod error;
mod facade;
mod filters;
mod health;
mod monitor;
mod probe;
pub mod reader;
pub mod schema;

pub use config::{
    ReaderConfig, CLUSTER_ID_KEY, DEFAULT_CLUSTER_ID, DEFAULT_MONITOR_INTERVAL,
    DEFAULT_PROBE_RETRIES, MONITOR_INTERVAL_KEY, PROBE_RETRIES_KEY, PROBE_RETRY_PAUSE,
    PROBE_SCANNER_TIMEOUT_KEY, PROBE_TIMEOUT_KEY, STORAGE_ENDPOINT_KEY, STORAGE_RETRIES_KEY,
    STORAGE_RPC_TIMEOUT_KEY, STORAGE_SCANNER_TIMEOUT_KEY,
};
pub use context::{ReadContext, ReadContextBuilder};
pub use dispatcher::{ReadOutput, ReadRequest, ReaderDispatcher};
pub use entity::{type_names, EntityIdentity, EntitySet, EntityType, TimelineEntity};
pub use error::{ReaderError, ReaderResult};
pub use facade::{ReaderState, TimelineReader};
pub use filters::{
    CompareOp, EntityFilters, Field, MetricFilter, RetrievalSpec, DEFAULT_ENTITY_LIMIT,
};
pub use health::{HealthReport, HealthStatus, CONNECTION_DOWN_MESSAGE};
pub use monitor::{
    LivenessMonitor, MonitorStats, ProbeOutcome, DEFAULT_STORAGE_LABEL, MONITOR_THREAD_NAME,
};
pub use probe::{StorageProbe, TableProbe};
pub use reader::{ReaderFactory, TableReaderFactory};
