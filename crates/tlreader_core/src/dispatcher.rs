//! Routes read requests to reader strategies.
//!
//! The three request shapes form a closed enum; [`ReaderDispatcher::dispatch`]
//! matches it exhaustively, so adding a shape is a compile error until every
//! caller handles it.

use crate::context::ReadContext;
use crate::entity::{EntitySet, EntityType, TimelineEntity};
use crate::error::{ReaderError, ReaderResult};
use crate::filters::{EntityFilters, RetrievalSpec};
use crate::reader::{ReaderFactory, TableReaderFactory};
use std::collections::BTreeSet;
use tlreader_storage::{ConnectionConfig, StorageConnection};
use tracing::debug;

/// A read request.
#[derive(Debug, Clone, Copy)]
pub enum ReadRequest<'a> {
    /// One entity.
    Entity {
        /// Entity to read.
        context: &'a ReadContext,
        /// Fields to return.
        retrieval: &'a RetrievalSpec,
    },
    /// A filtered collection.
    Entities {
        /// Scope of the collection.
        context: &'a ReadContext,
        /// Predicates and limit.
        filters: &'a EntityFilters,
        /// Fields to return.
        retrieval: &'a RetrievalSpec,
    },
    /// The entity types under one application.
    EntityTypes {
        /// Application scope.
        context: &'a ReadContext,
    },
}

impl ReadRequest<'_> {
    /// Context of the request.
    pub fn context(&self) -> &ReadContext {
        match self {
            ReadRequest::Entity { context, .. }
            | ReadRequest::Entities { context, .. }
            | ReadRequest::EntityTypes { context } => context,
        }
    }

    /// Short name used in logs.
    pub fn operation(&self) -> &'static str {
        match self {
            ReadRequest::Entity { .. } => "get_entity",
            ReadRequest::Entities { .. } => "get_entities",
            ReadRequest::EntityTypes { .. } => "get_entity_types",
        }
    }
}

/// Result of a [`ReadRequest`], one variant per request shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutput {
    /// Result of [`ReadRequest::Entity`].
    Entity(TimelineEntity),
    /// Result of [`ReadRequest::Entities`].
    Entities(EntitySet),
    /// Result of [`ReadRequest::EntityTypes`].
    EntityTypes(BTreeSet<String>),
}

/// Stateless router from requests to strategies built by a [`ReaderFactory`].
#[derive(Debug, Clone, Default)]
pub struct ReaderDispatcher<F: ReaderFactory = TableReaderFactory> {
    factory: F,
}

impl ReaderDispatcher {
    /// Creates a dispatcher over the schema tables.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: ReaderFactory> ReaderDispatcher<F> {
    /// Creates a dispatcher over a custom factory.
    pub fn with_factory(factory: F) -> Self {
        Self { factory }
    }

    /// The factory strategies are built from.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Reads one entity.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::InvalidRequest`] if `context` does not identify one entity
    /// - [`ReaderError::NotFound`] if the entity does not exist
    /// - [`ReaderError::Io`] if the backend fails
    pub fn read_single_entity(
        &self,
        config: &ConnectionConfig,
        conn: &dyn StorageConnection,
        context: &ReadContext,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<TimelineEntity> {
        if context.cluster_id().is_empty() {
            return Err(ReaderError::invalid("cluster id is required"));
        }
        let entity_type = context
            .entity_type()
            .ok_or_else(|| ReaderError::invalid("entity type is required"))?;
        let entity_id = identifying_id(context, entity_type)?;
        let reader = self.factory.single_entity_reader(context, retrieval)?;
        reader
            .read_entity(config, conn)?
            .ok_or_else(|| ReaderError::NotFound {
                entity_type: entity_type.to_string(),
                entity_id,
            })
    }

    /// Reads the entities in scope of `context` that match `filters`.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::InvalidRequest`] if the filters or scope are invalid
    /// - [`ReaderError::Io`] if the backend fails
    pub fn read_entity_collection(
        &self,
        config: &ConnectionConfig,
        conn: &dyn StorageConnection,
        context: &ReadContext,
        filters: &EntityFilters,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<EntitySet> {
        filters.validate()?;
        let reader = self.factory.multi_entity_reader(context, filters, retrieval)?;
        reader.read_entities(config, conn)
    }

    /// Lists the entity types under the application in `context`.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::InvalidRequest`] if the cluster or application is missing
    /// - [`ReaderError::Io`] if the backend fails
    pub fn read_entity_types(
        &self,
        config: &ConnectionConfig,
        conn: &dyn StorageConnection,
        context: &ReadContext,
    ) -> ReaderResult<BTreeSet<String>> {
        if context.cluster_id().is_empty() || context.app_id().map_or(true, str::is_empty) {
            return Err(ReaderError::invalid(
                "cluster id and application id are required",
            ));
        }
        let reader = self.factory.entity_type_reader(context)?;
        reader.read_entity_types(config, conn)
    }

    /// Routes `request` to the matching read.
    ///
    /// # Errors
    ///
    /// Returns the error of the routed read.
    pub fn dispatch(
        &self,
        config: &ConnectionConfig,
        conn: &dyn StorageConnection,
        request: ReadRequest<'_>,
    ) -> ReaderResult<ReadOutput> {
        debug!(operation = request.operation(), "dispatching read");
        match request {
            ReadRequest::Entity { context, retrieval } => self
                .read_single_entity(config, conn, context, retrieval)
                .map(ReadOutput::Entity),
            ReadRequest::Entities {
                context,
                filters,
                retrieval,
            } => self
                .read_entity_collection(config, conn, context, filters, retrieval)
                .map(ReadOutput::Entities),
            ReadRequest::EntityTypes { context } => self
                .read_entity_types(config, conn, context)
                .map(ReadOutput::EntityTypes),
        }
    }
}

/// Id naming the entity a single read targets. Applications may be named by
/// their application id and flow runs by their run id.
fn identifying_id(context: &ReadContext, entity_type: &str) -> ReaderResult<String> {
    let entity_id = context.entity_id().filter(|id| !id.is_empty());
    let id = match EntityType::parse(entity_type) {
        EntityType::Application => entity_id
            .or(context.app_id().filter(|id| !id.is_empty()))
            .map(str::to_string),
        EntityType::FlowRun => entity_id
            .map(str::to_string)
            .or_else(|| context.flow_run_id().map(|run| run.to_string())),
        EntityType::FlowActivity | EntityType::Generic(_) => entity_id.map(str::to_string),
    };
    id.ok_or_else(|| ReaderError::invalid("entity id is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::type_names;
    use crate::schema;
    use tlreader_storage::{Connector, InMemoryConnector, InMemoryStore, StorageError};

    fn setup() -> (ConnectionConfig, Box<dyn StorageConnection>) {
        let store = InMemoryStore::new();
        for id in ["app_1", "app_2"] {
            let entity = TimelineEntity::new(type_names::APPLICATION, id).with_created_time(1);
            store.put(
                schema::APPLICATION_TABLE,
                schema::entity_row(schema::application_key("c1", "u", "f", 7, id), &entity)
                    .unwrap(),
            );
        }
        let container = TimelineEntity::new("YARN_CONTAINER", "c_1");
        store.put(
            schema::ENTITY_TABLE,
            schema::entity_row(
                schema::entity_key("c1", "app_1", "YARN_CONTAINER", 0, "c_1"),
                &container,
            )
            .unwrap(),
        );
        let config = ConnectionConfig::default();
        let conn = InMemoryConnector::new(store).open(&config).unwrap();
        (config, conn)
    }

    fn apps() -> ReadContext {
        ReadContext::builder("c1")
            .user_id("u")
            .flow_name("f")
            .flow_run_id(7)
            .entity_type(type_names::APPLICATION)
            .build()
    }

    #[test]
    fn collection_returns_exactly_matching_entities() {
        let (config, conn) = setup();
        let dispatcher = ReaderDispatcher::new();
        let set = dispatcher
            .read_entity_collection(
                &config,
                conn.as_ref(),
                &apps(),
                &EntityFilters::new(),
                &RetrievalSpec::new(),
            )
            .unwrap();
        let expected: EntitySet = ["app_1", "app_2"]
            .into_iter()
            .map(|id| TimelineEntity::new(type_names::APPLICATION, id))
            .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn missing_single_entity_is_not_found() {
        let (config, conn) = setup();
        let context = ReadContext::builder("c1")
            .user_id("u")
            .flow_name("f")
            .flow_run_id(7)
            .entity_type(type_names::APPLICATION)
            .app_id("app_9")
            .build();
        let err = ReaderDispatcher::new()
            .read_single_entity(&config, conn.as_ref(), &context, &RetrievalSpec::new())
            .unwrap_err();
        assert!(matches!(err, ReaderError::NotFound { ref entity_id, .. } if entity_id == "app_9"));
    }

    #[test]
    fn single_read_without_id_never_reaches_factory() {
        struct RejectingFactory;
        impl ReaderFactory for RejectingFactory {
            fn single_entity_reader(
                &self,
                _context: &ReadContext,
                _retrieval: &RetrievalSpec,
            ) -> ReaderResult<Box<dyn crate::reader::SingleEntityReader>> {
                panic!("factory called for a request without an id");
            }
            fn multi_entity_reader(
                &self,
                context: &ReadContext,
                filters: &EntityFilters,
                retrieval: &RetrievalSpec,
            ) -> ReaderResult<Box<dyn crate::reader::MultiEntityReader>> {
                TableReaderFactory.multi_entity_reader(context, filters, retrieval)
            }
            fn entity_type_reader(
                &self,
                context: &ReadContext,
            ) -> ReaderResult<Box<dyn crate::reader::EntityTypeReader>> {
                TableReaderFactory.entity_type_reader(context)
            }
        }

        let (config, conn) = setup();
        let dispatcher = ReaderDispatcher::with_factory(RejectingFactory);
        for context in [
            ReadContext::builder("c1")
                .app_id("app_1")
                .entity_type("YARN_CONTAINER")
                .build(),
            ReadContext::builder("c1")
                .user_id("u")
                .flow_name("f")
                .flow_run_id(7)
                .entity_type(type_names::APPLICATION)
                .build(),
            ReadContext::builder("c1")
                .user_id("u")
                .flow_name("f")
                .entity_type(type_names::FLOW_RUN)
                .build(),
        ] {
            let err = dispatcher
                .read_single_entity(&config, conn.as_ref(), &context, &RetrievalSpec::new())
                .unwrap_err();
            assert!(matches!(err, ReaderError::InvalidRequest(_)), "{err:?}");
        }
    }

    #[test]
    fn missing_flow_run_reports_run_id() {
        let (config, conn) = setup();
        let context = ReadContext::builder("c1")
            .user_id("u")
            .flow_name("f")
            .flow_run_id(42)
            .entity_type(type_names::FLOW_RUN)
            .build();
        let err = ReaderDispatcher::new()
            .read_single_entity(&config, conn.as_ref(), &context, &RetrievalSpec::new())
            .unwrap_err();
        assert!(matches!(err, ReaderError::NotFound { ref entity_id, .. } if entity_id == "42"));
    }

    #[test]
    fn dispatch_routes_each_shape() {
        let (config, conn) = setup();
        let dispatcher = ReaderDispatcher::new();
        let single = ReadContext::builder("c1")
            .user_id("u")
            .flow_name("f")
            .flow_run_id(7)
            .entity_type(type_names::APPLICATION)
            .entity_id("app_2")
            .build();
        let retrieval = RetrievalSpec::new();
        let filters = EntityFilters::new();
        let app = ReadContext::builder("c1").app_id("app_1").build();

        match dispatcher
            .dispatch(
                &config,
                conn.as_ref(),
                ReadRequest::Entity {
                    context: &single,
                    retrieval: &retrieval,
                },
            )
            .unwrap()
        {
            ReadOutput::Entity(entity) => assert_eq!(entity.id, "app_2"),
            other => panic!("unexpected output {other:?}"),
        }

        let context = apps();
        match dispatcher
            .dispatch(
                &config,
                conn.as_ref(),
                ReadRequest::Entities {
                    context: &context,
                    filters: &filters,
                    retrieval: &retrieval,
                },
            )
            .unwrap()
        {
            ReadOutput::Entities(set) => assert_eq!(set.len(), 2),
            other => panic!("unexpected output {other:?}"),
        }

        let output = dispatcher
            .dispatch(&config, conn.as_ref(), ReadRequest::EntityTypes { context: &app })
            .unwrap();
        assert_eq!(
            output,
            ReadOutput::EntityTypes(BTreeSet::from(["YARN_CONTAINER".to_string()]))
        );
    }

    #[test]
    fn invalid_requests_fail_before_io() {
        let (config, conn) = setup();
        conn.close().unwrap();
        let dispatcher = ReaderDispatcher::new();

        let no_type = ReadContext::builder("c1").entity_id("x").build();
        let err = dispatcher
            .read_single_entity(&config, conn.as_ref(), &no_type, &RetrievalSpec::new())
            .unwrap_err();
        assert!(matches!(err, ReaderError::InvalidRequest(_)));

        let err = dispatcher
            .read_entity_collection(
                &config,
                conn.as_ref(),
                &apps(),
                &EntityFilters::new().with_limit(0),
                &RetrievalSpec::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ReaderError::InvalidRequest(_)));

        let err = dispatcher
            .read_entity_types(&config, conn.as_ref(), &ReadContext::builder("c1").build())
            .unwrap_err();
        assert!(matches!(err, ReaderError::InvalidRequest(_)));
    }

    #[test]
    fn storage_failure_is_io() {
        let (config, conn) = setup();
        conn.close().unwrap();
        let err = ReaderDispatcher::new()
            .read_entity_collection(
                &config,
                conn.as_ref(),
                &apps(),
                &EntityFilters::new(),
                &RetrievalSpec::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ReaderError::Io(StorageError::Closed)));
    }
}
