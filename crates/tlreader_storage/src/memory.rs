//! In-memory columnar store for testing and embedding.

use crate::config::ConnectionConfig;
use crate::connection::{Connector, StorageConnection};
use crate::error::{StorageError, StorageResult};
use crate::row::{Row, Scan};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Table = BTreeMap<Vec<u8>, Row>;

/// An in-memory set of sorted tables.
///
/// Cloning an `InMemoryStore` yields another handle to the same tables, so
/// tests can keep a handle for seeding while connections read through
/// another.
///
/// # Example
///
/// ```rust
/// use tlreader_storage::{
///     Connector, ConnectionConfig, InMemoryConnector, InMemoryStore, Row, Scan,
/// };
///
/// let store = InMemoryStore::new();
/// store.put("t", Row::new(b"a!1".to_vec()).with_cell("i:x", vec![1]));
///
/// let conn = InMemoryConnector::new(store).open(&ConnectionConfig::default()).unwrap();
/// let rows = conn.scan("t", &Scan::prefix(b"a!".to_vec())).unwrap();
/// assert_eq!(rows.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<BTreeMap<String, Table>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table. Existing tables are left untouched.
    pub fn create_table(&self, table: &str) {
        self.tables.write().entry(table.to_string()).or_default();
    }

    /// Inserts or replaces a row, creating the table if needed.
    pub fn put(&self, table: &str, row: Row) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(row.key.clone(), row);
    }

    /// Returns the number of rows in a table (0 if it does not exist).
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Removes every table.
    pub fn clear(&self) {
        self.tables.write().clear();
    }

    fn get(&self, table: &str, key: &[u8]) -> StorageResult<Option<Row>> {
        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(rows.get(key).cloned())
    }

    fn scan(&self, table: &str, scan: &Scan) -> StorageResult<Vec<Row>> {
        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        let limit = scan.limit.unwrap_or(usize::MAX);
        Ok(rows
            .range(scan.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&scan.prefix))
            .filter(|(key, _)| scan.matches(key))
            .take(limit)
            .map(|(_, row)| scan.project(row))
            .collect())
    }
}

/// Opens [`InMemoryConnection`]s over a shared [`InMemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    store: InMemoryStore,
}

impl InMemoryConnector {
    /// Creates a connector over `store`.
    pub fn new(store: InMemoryStore) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }
}

impl Connector for InMemoryConnector {
    fn open(&self, config: &ConnectionConfig) -> StorageResult<Box<dyn StorageConnection>> {
        Ok(Box::new(InMemoryConnection::new(
            self.store.clone(),
            config.clone(),
        )))
    }
}

/// A connection to an [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryConnection {
    store: InMemoryStore,
    config: ConnectionConfig,
    closed: AtomicBool,
}

impl InMemoryConnection {
    /// Creates a connection over `store`.
    pub fn new(store: InMemoryStore, config: ConnectionConfig) -> Self {
        Self {
            store,
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the configuration this connection was opened with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StorageConnection for InMemoryConnection {
    fn get(&self, table: &str, key: &[u8]) -> StorageResult<Option<Row>> {
        self.ensure_open()?;
        self.store.get(table, key)
    }

    fn scan(&self, table: &str, scan: &Scan) -> StorageResult<Vec<Row>> {
        self.ensure_open()?;
        self.store.scan(table, scan)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
