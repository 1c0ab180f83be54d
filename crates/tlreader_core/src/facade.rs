//! The reader facade: lifecycle, gating and health.

use crate::config::ReaderConfig;
use crate::context::ReadContext;
use crate::dispatcher::{ReadOutput, ReadRequest, ReaderDispatcher};
use crate::entity::{EntitySet, TimelineEntity};
use crate::error::{ReaderError, ReaderResult};
use crate::filters::{EntityFilters, RetrievalSpec};
use crate::health::{HealthReport, CONNECTION_DOWN_MESSAGE};
use crate::monitor::LivenessMonitor;
use crate::probe::TableProbe;
use crate::reader::{ReaderFactory, TableReaderFactory};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::sync::Arc;
use tlreader_storage::{Connector, StorageConnection};
use tracing::{info, warn};

/// Lifecycle state of a [`TimelineReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Constructed; nothing opened.
    Created,
    /// Connections open and monitor built, probe thread not running.
    Initialized,
    /// Serving reads.
    Started,
    /// Resources released. Terminal.
    Stopped,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReaderState::Created => "created",
            ReaderState::Initialized => "initialized",
            ReaderState::Started => "started",
            ReaderState::Stopped => "stopped",
        })
    }
}

struct Running {
    connection: Box<dyn StorageConnection>,
    monitor: Arc<LivenessMonitor>,
}

impl Running {
    /// Reverse of opening: the probe goes first, then the main connection.
    fn shutdown(self) -> ReaderResult<()> {
        self.monitor.stop();
        self.connection.close()?;
        Ok(())
    }
}

enum Lifecycle {
    Created,
    Initialized(Running),
    Started(Running),
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> ReaderState {
        match self {
            Lifecycle::Created => ReaderState::Created,
            Lifecycle::Initialized(_) => ReaderState::Initialized,
            Lifecycle::Started(_) => ReaderState::Started,
            Lifecycle::Stopped => ReaderState::Stopped,
        }
    }
}

/// Read-only timeline service over a columnar store, gated on storage
/// liveness.
///
/// A reader owns two connections: one for foreground reads and one, with
/// tighter timeouts, for its [`LivenessMonitor`]. Every read first checks
/// the monitor's cached verdict and fails with
/// [`ReaderError::StorageUnavailable`] without touching storage while the
/// verdict is down.
///
/// # Example
///
/// ```
/// use tlreader_core::{schema, ReadContext, ReaderConfig, TimelineReader};
/// use tlreader_storage::{InMemoryConnector, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.create_table(schema::ENTITY_TABLE);
/// store.create_table(schema::FLOW_ACTIVITY_TABLE);
///
/// let reader = TimelineReader::new(ReaderConfig::new(), InMemoryConnector::new(store))?;
/// reader.start()?;
/// let context = ReadContext::builder("yarn-cluster").app_id("app_1").build();
/// assert!(reader.get_entity_types(&context)?.is_empty());
/// assert!(reader.get_health_status().is_running());
/// reader.stop()?;
/// # Ok::<(), tlreader_core::ReaderError>(())
/// ```
pub struct TimelineReader<C: Connector, F: ReaderFactory = TableReaderFactory> {
    config: ReaderConfig,
    connector: C,
    dispatcher: ReaderDispatcher<F>,
    lifecycle: RwLock<Lifecycle>,
}

impl<C: Connector> TimelineReader<C> {
    /// Creates a reader over the schema tables.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidConfig`] if `config` is invalid.
    pub fn new(config: ReaderConfig, connector: C) -> ReaderResult<Self> {
        Self::with_factory(config, connector, TableReaderFactory)
    }
}

impl<C: Connector, F: ReaderFactory> TimelineReader<C, F> {
    /// Creates a reader whose strategies come from `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidConfig`] if `config` is invalid.
    pub fn with_factory(config: ReaderConfig, connector: C, factory: F) -> ReaderResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            dispatcher: ReaderDispatcher::with_factory(factory),
            lifecycle: RwLock::new(Lifecycle::Created),
        })
    }

    /// Opens the main connection, then the probe connection, and builds the
    /// liveness monitor.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::IllegalState`] unless the reader is newly created
    /// - [`ReaderError::Io`] if a connection cannot be opened
    pub fn init(&self) -> ReaderResult<()> {
        let mut lifecycle = self.lifecycle.write();
        if !matches!(*lifecycle, Lifecycle::Created) {
            return Err(illegal_state("init", &lifecycle));
        }
        *lifecycle = Lifecycle::Initialized(self.open()?);
        info!(cluster_id = %self.config.cluster_id, "timeline reader initialized");
        Ok(())
    }

    /// Starts the liveness monitor, initializing first if needed.
    ///
    /// Calling `start` on a started reader does nothing.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::IllegalState`] if the reader was stopped
    /// - [`ReaderError::Io`] if initialization or the monitor fails
    pub fn start(&self) -> ReaderResult<()> {
        let mut lifecycle = self.lifecycle.write();
        let running = match mem::replace(&mut *lifecycle, Lifecycle::Created) {
            Lifecycle::Created => self.open()?,
            Lifecycle::Initialized(running) => running,
            started @ Lifecycle::Started(_) => {
                *lifecycle = started;
                return Ok(());
            }
            Lifecycle::Stopped => {
                *lifecycle = Lifecycle::Stopped;
                return Err(ReaderError::IllegalState {
                    operation: "start",
                    state: ReaderState::Stopped.to_string(),
                });
            }
        };

        if let Err(e) = running.monitor.start() {
            *lifecycle = Lifecycle::Stopped;
            if let Err(close) = running.shutdown() {
                warn!(error = %close, "failed to release connections after start failure");
            }
            return Err(e);
        }
        *lifecycle = Lifecycle::Started(running);
        info!(cluster_id = %self.config.cluster_id, "timeline reader started");
        Ok(())
    }

    /// Stops the monitor, which closes the probe connection, then closes
    /// the main connection.
    ///
    /// Valid in every state; a stopped reader stays stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Io`] if the main connection fails to close.
    /// The reader is stopped either way.
    pub fn stop(&self) -> ReaderResult<()> {
        // Waiting out an in-flight probe happens after the lock is released,
        // so health checks and reads see `Stopped` immediately.
        let previous = mem::replace(&mut *self.lifecycle.write(), Lifecycle::Stopped);
        match previous {
            Lifecycle::Initialized(running) | Lifecycle::Started(running) => {
                running.shutdown()?;
                info!(cluster_id = %self.config.cluster_id, "timeline reader stopped");
            }
            Lifecycle::Created | Lifecycle::Stopped => {}
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReaderState {
        self.lifecycle.read().state()
    }

    /// The liveness monitor, while initialized or started.
    pub fn monitor(&self) -> Option<Arc<LivenessMonitor>> {
        match &*self.lifecycle.read() {
            Lifecycle::Initialized(running) | Lifecycle::Started(running) => {
                Some(Arc::clone(&running.monitor))
            }
            Lifecycle::Created | Lifecycle::Stopped => None,
        }
    }

    /// Reader configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// The dispatcher reads are routed through.
    pub fn dispatcher(&self) -> &ReaderDispatcher<F> {
        &self.dispatcher
    }

    /// Reads one entity.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::IllegalState`] unless started
    /// - [`ReaderError::StorageUnavailable`] while storage is down
    /// - any error of [`ReaderDispatcher::read_single_entity`]
    pub fn get_entity(
        &self,
        context: &ReadContext,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<TimelineEntity> {
        self.gated("get_entity", |running| {
            self.dispatcher.read_single_entity(
                &self.config.storage,
                running.connection.as_ref(),
                context,
                retrieval,
            )
        })
    }

    /// Reads the entities in scope of `context` that match `filters`.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::IllegalState`] unless started
    /// - [`ReaderError::StorageUnavailable`] while storage is down
    /// - any error of [`ReaderDispatcher::read_entity_collection`]
    pub fn get_entities(
        &self,
        context: &ReadContext,
        filters: &EntityFilters,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<EntitySet> {
        self.gated("get_entities", |running| {
            self.dispatcher.read_entity_collection(
                &self.config.storage,
                running.connection.as_ref(),
                context,
                filters,
                retrieval,
            )
        })
    }

    /// Lists the entity types under the application in `context`.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::IllegalState`] unless started
    /// - [`ReaderError::StorageUnavailable`] while storage is down
    /// - any error of [`ReaderDispatcher::read_entity_types`]
    pub fn get_entity_types(&self, context: &ReadContext) -> ReaderResult<BTreeSet<String>> {
        self.gated("get_entity_types", |running| {
            self.dispatcher.read_entity_types(
                &self.config.storage,
                running.connection.as_ref(),
                context,
            )
        })
    }

    /// Serves any [`ReadRequest`].
    ///
    /// # Errors
    ///
    /// Same as the matching `get_*` method.
    pub fn read(&self, request: ReadRequest<'_>) -> ReaderResult<ReadOutput> {
        self.gated(request.operation(), |running| {
            self.dispatcher
                .dispatch(&self.config.storage, running.connection.as_ref(), request)
        })
    }

    /// Reports whether the reader can serve reads. Never fails.
    pub fn get_health_status(&self) -> HealthReport {
        match &*self.lifecycle.read() {
            Lifecycle::Started(running) => match running.monitor.check_storage_is_up() {
                Ok(()) => HealthReport::running(),
                Err(_) => HealthReport::connection_failure(CONNECTION_DOWN_MESSAGE),
            },
            other => {
                HealthReport::connection_failure(format!("timeline reader is {}", other.state()))
            }
        }
    }

    fn gated<T>(
        &self,
        operation: &'static str,
        read: impl FnOnce(&Running) -> ReaderResult<T>,
    ) -> ReaderResult<T> {
        let lifecycle = self.lifecycle.read();
        match &*lifecycle {
            Lifecycle::Started(running) => {
                running.monitor.check_storage_is_up()?;
                read(running)
            }
            _ => Err(illegal_state(operation, &lifecycle)),
        }
    }

    fn open(&self) -> ReaderResult<Running> {
        let connection = self.connector.open(&self.config.storage)?;
        let monitor = TableProbe::connect(&self.connector, &self.config).and_then(|probe| {
            LivenessMonitor::new(Box::new(probe), self.config.monitor_interval)
        });
        match monitor {
            Ok(monitor) => Ok(Running {
                connection,
                monitor: Arc::new(monitor),
            }),
            Err(e) => {
                if let Err(close) = connection.close() {
                    warn!(error = %close, "failed to close main connection");
                }
                Err(e)
            }
        }
    }
}

impl<C: Connector, F: ReaderFactory> Drop for TimelineReader<C, F> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop timeline reader on drop");
        }
    }
}

impl<C: Connector, F: ReaderFactory> fmt::Debug for TimelineReader<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineReader")
            .field("cluster_id", &self.config.cluster_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn illegal_state(operation: &'static str, lifecycle: &Lifecycle) -> ReaderError {
    ReaderError::IllegalState {
        operation,
        state: lifecycle.state().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::type_names;
    use crate::health::HealthStatus;
    use crate::monitor::ProbeOutcome;
    use crate::schema;
    use std::time::Duration;
    use tlreader_storage::{InMemoryConnector, InMemoryStore};

    fn reader() -> (TimelineReader<InMemoryConnector>, InMemoryStore) {
        let store = InMemoryStore::new();
        store.create_table(schema::FLOW_ACTIVITY_TABLE);
        let entity = TimelineEntity::new("YARN_CONTAINER", "c_1");
        store.put(
            schema::ENTITY_TABLE,
            schema::entity_row(
                schema::entity_key("c1", "app_1", "YARN_CONTAINER", 0, "c_1"),
                &entity,
            )
            .unwrap(),
        );
        let config = ReaderConfig::new()
            .with_cluster_id("c1")
            .with_monitor_interval(Duration::from_secs(3600));
        let reader = TimelineReader::new(config, InMemoryConnector::new(store.clone())).unwrap();
        (reader, store)
    }

    fn wait_for_first_probe(monitor: &LivenessMonitor) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while (monitor.stats().probes_run == 0 || monitor.is_probing())
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn app_context() -> ReadContext {
        ReadContext::builder("c1").app_id("app_1").build()
    }

    #[test]
    fn lifecycle_transitions() {
        let (reader, _store) = reader();
        assert_eq!(reader.state(), ReaderState::Created);
        assert!(reader.monitor().is_none());

        reader.init().unwrap();
        assert_eq!(reader.state(), ReaderState::Initialized);
        assert!(reader.monitor().is_some());
        assert!(matches!(
            reader.init(),
            Err(ReaderError::IllegalState { operation: "init", .. })
        ));

        reader.start().unwrap();
        reader.start().unwrap();
        assert_eq!(reader.state(), ReaderState::Started);

        reader.stop().unwrap();
        reader.stop().unwrap();
        assert_eq!(reader.state(), ReaderState::Stopped);
        assert!(reader.monitor().is_none());
        assert!(matches!(
            reader.start(),
            Err(ReaderError::IllegalState { operation: "start", .. })
        ));
    }

    #[test]
    fn start_initializes_when_needed() {
        let (reader, _store) = reader();
        reader.start().unwrap();
        assert_eq!(reader.state(), ReaderState::Started);
        assert!(reader.monitor().unwrap().is_running());
    }

    #[test]
    fn stop_before_start_is_fine() {
        let (reader, _store) = reader();
        reader.stop().unwrap();
        assert_eq!(reader.state(), ReaderState::Stopped);
    }

    #[test]
    fn reads_require_started() {
        let (reader, _store) = reader();
        let err = reader.get_entity_types(&app_context()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot get_entity_types while reader is created"
        );
        reader.init().unwrap();
        assert!(matches!(
            reader.get_entity_types(&app_context()),
            Err(ReaderError::IllegalState { .. })
        ));
    }

    #[test]
    fn serves_reads_while_up() {
        let (reader, _store) = reader();
        reader.start().unwrap();
        let types = reader.get_entity_types(&app_context()).unwrap();
        assert_eq!(types, BTreeSet::from(["YARN_CONTAINER".to_string()]));

        let context = ReadContext::builder("c1")
            .app_id("app_1")
            .entity_type("YARN_CONTAINER")
            .entity_id("c_1")
            .build();
        let output = reader
            .read(ReadRequest::Entity {
                context: &context,
                retrieval: &RetrievalSpec::new(),
            })
            .unwrap();
        assert!(matches!(output, ReadOutput::Entity(ref e) if e.id == "c_1"));
    }

    #[test]
    fn gate_rejects_reads_while_down() {
        let (reader, store) = reader();
        reader.start().unwrap();
        let monitor = reader.monitor().unwrap();
        wait_for_first_probe(&monitor);

        store.clear();
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Down);
        let err = reader
            .get_entities(
                &ReadContext::builder("c1")
                    .entity_type(type_names::FLOW_ACTIVITY)
                    .build(),
                &EntityFilters::new(),
                &RetrievalSpec::new(),
            )
            .unwrap_err();
        assert!(err.is_unavailable());

        let health = reader.get_health_status();
        assert_eq!(health.status, HealthStatus::ConnectionFailure);
        assert_eq!(health.message, CONNECTION_DOWN_MESSAGE);

        store.create_table(schema::FLOW_ACTIVITY_TABLE);
        assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Up);
        assert_eq!(reader.get_health_status(), HealthReport::running());
    }

    #[test]
    fn health_outside_started_names_state() {
        let (reader, _store) = reader();
        let health = reader.get_health_status();
        assert_eq!(health.status, HealthStatus::ConnectionFailure);
        assert_eq!(health.message, "timeline reader is created");

        reader.start().unwrap();
        reader.stop().unwrap();
        assert_eq!(
            reader.get_health_status().message,
            "timeline reader is stopped"
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ReaderConfig::new().with_monitor_interval(Duration::ZERO);
        let result = TimelineReader::new(config, InMemoryConnector::default());
        assert!(matches!(result, Err(ReaderError::InvalidConfig(_))));
    }
}
