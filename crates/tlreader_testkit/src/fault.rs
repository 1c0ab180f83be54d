//! Fault injection for storage connections.
//!
//! [`FaultyConnector`] opens connections over an [`InMemoryStore`] that
//! consult a shared [`FaultPlan`] before every operation. Tests flip the
//! plan to simulate an outage, transient failures or a slow backend, and
//! read its counters to see which operations reached storage.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tlreader_storage::{
    ConnectionConfig, Connector, InMemoryConnector, InMemoryStore, Row, Scan, StorageConnection,
    StorageError, StorageResult,
};

/// Faults applied to every connection of a [`FaultyConnector`].
#[derive(Debug, Default)]
pub struct FaultPlan {
    offline: AtomicBool,
    fail_next: AtomicUsize,
    latency_ms: AtomicU64,
    opens: AtomicUsize,
    gets: AtomicUsize,
    scans: AtomicUsize,
    closes: AtomicUsize,
    opened: Mutex<Vec<ConnectionConfig>>,
}

impl FaultPlan {
    /// Creates a plan with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every open and operation fail as unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fails the next `count` operations with an I/O error.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Delays every operation. An operation slower than its connection's
    /// RPC timeout fails with [`StorageError::Timeout`] after the timeout.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Clears all faults. Counters are kept.
    pub fn heal(&self) {
        self.offline.store(false, Ordering::SeqCst);
        self.fail_next.store(0, Ordering::SeqCst);
        self.latency_ms.store(0, Ordering::SeqCst);
    }

    /// Returns whether the backend is simulated offline.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of connections opened, including failed attempts.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of `get` and `scan` calls, including failed ones.
    pub fn read_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.scans.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Configurations passed to `open`, in order.
    pub fn opened_configs(&self) -> Vec<ConnectionConfig> {
        self.opened.lock().clone()
    }

    fn check(&self, operation: &'static str, config: &ConnectionConfig) -> StorageResult<()> {
        if self.is_offline() {
            return Err(StorageError::Unreachable(format!(
                "{} is offline",
                config.endpoint
            )));
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("simulated failure during {operation}"),
            )));
        }
        let latency = Duration::from_millis(self.latency_ms.load(Ordering::SeqCst));
        if latency > config.rpc_timeout {
            thread::sleep(config.rpc_timeout);
            return Err(StorageError::Timeout {
                operation,
                timeout: config.rpc_timeout,
            });
        }
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        Ok(())
    }
}

/// A connector whose connections obey a shared [`FaultPlan`].
#[derive(Debug, Clone)]
pub struct FaultyConnector {
    inner: InMemoryConnector,
    plan: Arc<FaultPlan>,
}

impl FaultyConnector {
    /// Creates a connector over `store` with no faults.
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            inner: InMemoryConnector::new(store),
            plan: Arc::new(FaultPlan::new()),
        }
    }

    /// The plan shared by every connection of this connector.
    pub fn plan(&self) -> Arc<FaultPlan> {
        Arc::clone(&self.plan)
    }

    /// The backing store.
    pub fn store(&self) -> &InMemoryStore {
        self.inner.store()
    }
}

impl Connector for FaultyConnector {
    fn open(&self, config: &ConnectionConfig) -> StorageResult<Box<dyn StorageConnection>> {
        self.plan.opens.fetch_add(1, Ordering::SeqCst);
        self.plan.opened.lock().push(config.clone());
        if self.plan.is_offline() {
            return Err(StorageError::Unreachable(format!(
                "cannot connect to {}",
                config.endpoint
            )));
        }
        Ok(Box::new(FaultyConnection {
            inner: self.inner.open(config)?,
            plan: Arc::clone(&self.plan),
            config: config.clone(),
        }))
    }
}

struct FaultyConnection {
    inner: Box<dyn StorageConnection>,
    plan: Arc<FaultPlan>,
    config: ConnectionConfig,
}

impl StorageConnection for FaultyConnection {
    fn get(&self, table: &str, key: &[u8]) -> StorageResult<Option<Row>> {
        self.plan.gets.fetch_add(1, Ordering::SeqCst);
        self.plan.check("get", &self.config)?;
        self.inner.get(table, key)
    }

    fn scan(&self, table: &str, scan: &Scan) -> StorageResult<Vec<Row>> {
        self.plan.scans.fetch_add(1, Ordering::SeqCst);
        self.plan.check("scan", &self.config)?;
        self.inner.scan(table, scan)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn close(&self) -> StorageResult<()> {
        self.plan.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}
