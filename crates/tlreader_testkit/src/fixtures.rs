//! Seeded stores and reader helpers.

use crate::fault::FaultyConnector;
use std::time::{Duration, Instant};
use tlreader_core::{schema, LivenessMonitor, ReaderConfig, TimelineEntity};
use tlreader_storage::{InMemoryConnector, InMemoryStore};

/// Cluster used by fixtures unless another is given.
pub const TEST_CLUSTER: &str = "test-cluster";

/// An in-memory store with the schema tables created, plus helpers that
/// write entities under the right row keys.
#[derive(Debug, Clone)]
pub struct TimelineFixture {
    store: InMemoryStore,
    cluster: String,
}

impl TimelineFixture {
    /// Creates an empty fixture for [`TEST_CLUSTER`].
    pub fn new() -> Self {
        Self::with_cluster(TEST_CLUSTER)
    }

    /// Creates an empty fixture for `cluster`.
    pub fn with_cluster(cluster: impl Into<String>) -> Self {
        let store = InMemoryStore::new();
        for table in [
            schema::ENTITY_TABLE,
            schema::APPLICATION_TABLE,
            schema::FLOW_RUN_TABLE,
            schema::FLOW_ACTIVITY_TABLE,
        ] {
            store.create_table(table);
        }
        Self {
            store,
            cluster: cluster.into(),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// The fixture's cluster.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// A connector over the store.
    pub fn connector(&self) -> InMemoryConnector {
        InMemoryConnector::new(self.store.clone())
    }

    /// A fault-injecting connector over the store.
    pub fn faulty_connector(&self) -> FaultyConnector {
        FaultyConnector::new(self.store.clone())
    }

    /// A reader configuration for the fixture's cluster.
    pub fn config(&self, monitor_interval: Duration) -> ReaderConfig {
        ReaderConfig::new()
            .with_cluster_id(self.cluster.clone())
            .with_monitor_interval(monitor_interval)
    }

    /// Stores a generic entity under `app`.
    pub fn put_entity(&self, app: &str, entity: &TimelineEntity) {
        let key = schema::entity_key(
            &self.cluster,
            app,
            &entity.entity_type,
            entity.id_prefix,
            &entity.id,
        );
        self.put(schema::ENTITY_TABLE, key, entity);
    }

    /// Stores an application entity under its flow run.
    pub fn put_application(&self, user: &str, flow: &str, run: u64, entity: &TimelineEntity) {
        let key = schema::application_key(&self.cluster, user, flow, run, &entity.id);
        self.put(schema::APPLICATION_TABLE, key, entity);
    }

    /// Stores a flow run entity.
    pub fn put_flow_run(&self, user: &str, flow: &str, run: u64, entity: &TimelineEntity) {
        let key = schema::flow_run_key(&self.cluster, user, flow, run);
        self.put(schema::FLOW_RUN_TABLE, key, entity);
    }

    /// Stores a flow activity record for the day containing `day_ms`.
    pub fn put_flow_activity(&self, day_ms: u64, user: &str, flow: &str, entity: &TimelineEntity) {
        let key = schema::flow_activity_key(&self.cluster, day_ms, user, flow);
        self.put(schema::FLOW_ACTIVITY_TABLE, key, entity);
    }

    fn put(&self, table: &str, key: Vec<u8>, entity: &TimelineEntity) {
        let row = schema::entity_row(key, entity).expect("Failed to encode entity");
        self.store.put(table, row);
    }
}

impl Default for TimelineFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits until `monitor` has completed at least `probes` probes and none
/// is in flight.
pub fn wait_for_probes(monitor: &LivenessMonitor, probes: u64, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while monitor.stats().probes_run < probes || monitor.is_probing() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}
