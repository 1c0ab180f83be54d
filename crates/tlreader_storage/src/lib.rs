//! # tlreader storage
//!
//! Columnar storage client abstraction for the timeline reader.
//!
//! This crate models the storage client the reader depends on: a
//! [`Connector`] opens [`StorageConnection`]s with a [`ConnectionConfig`],
//! and connections answer point `get`s and prefix `scan`s over sorted
//! tables of [`Row`]s. Cells are opaque bytes; the reader owns all
//! interpretation of row keys and cell values.
//!
//! ## Design Principles
//!
//! - Connections are `Send + Sync` and shared by reference
//! - Timeouts and retries belong to the connection, not to its callers
//! - Closing is idempotent
//!
//! ## Available Backends
//!
//! - [`InMemoryConnector`] - sorted in-memory tables for tests and embedding

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod memory;
mod row;

pub use config::ConnectionConfig;
pub use connection::{Connector, StorageConnection};
pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryConnection, InMemoryConnector, InMemoryStore};
pub use row::{Row, Scan};
