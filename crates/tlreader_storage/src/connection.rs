//! Connection and connector traits.

use crate::config::ConnectionConfig;
use crate::error::StorageResult;
use crate::row::{Row, Scan};

/// An open connection to the storage backend.
///
/// Connections are shared by reference with reader strategies and must be
/// safe to use from several threads at once. Implementations are expected to
/// honour the timeouts and retry policy of the [`ConnectionConfig`] they were
/// opened with.
///
/// # Invariants
///
/// - `scan` returns rows in ascending key order
/// - after `close` returns, every other call fails with `StorageError::Closed`
/// - `close` is idempotent
pub trait StorageConnection: Send + Sync {
    /// Reads one row by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, the connection is
    /// closed, or the backend fails.
    fn get(&self, table: &str, key: &[u8]) -> StorageResult<Option<Row>>;

    /// Scans a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, the connection is
    /// closed, or the backend fails.
    fn scan(&self, table: &str, scan: &Scan) -> StorageResult<Vec<Row>>;

    /// Returns true once the connection has been closed.
    fn is_closed(&self) -> bool;

    /// Closes the connection and releases its resources.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing resources fails.
    fn close(&self) -> StorageResult<()>;
}

/// Opens connections to a storage backend.
pub trait Connector: Send + Sync {
    /// Opens a new connection using `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn open(&self, config: &ConnectionConfig) -> StorageResult<Box<dyn StorageConnection>>;
}
