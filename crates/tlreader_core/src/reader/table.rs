//! Entity readers over the schema tables.

use super::{MultiEntityReader, SingleEntityReader, TableKind};
use crate::context::ReadContext;
use crate::entity::{EntitySet, TimelineEntity};
use crate::error::{ReaderError, ReaderResult};
use crate::filters::{EntityFilters, RetrievalSpec};
use crate::schema::{self, RowKey, ENTITY_COLUMN};
use tlreader_storage::{ConnectionConfig, Scan, StorageConnection};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    /// The full row key is known.
    Key(Vec<u8>),
    /// Generic entity without an id prefix: scan the type and match the id.
    ScanForId { prefix: Vec<u8>, id: String },
}

/// Reads one entity from the table selected by its type.
#[derive(Debug, Clone)]
pub struct TableEntityReader {
    kind: TableKind,
    entity_type: String,
    entity_id: String,
    lookup: Lookup,
    retrieval: RetrievalSpec,
}

impl TableEntityReader {
    /// Builds a reader for the entity identified by `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidRequest`] if `context` does not identify
    /// exactly one entity, or names flow activity.
    pub fn single(context: &ReadContext, retrieval: &RetrievalSpec) -> ReaderResult<Self> {
        let cluster = require_cluster(context)?;
        let entity_type = require(context.entity_type(), "entity type")?;
        let kind = TableKind::for_type(&crate::entity::EntityType::parse(entity_type));

        let (entity_id, lookup) = match kind {
            TableKind::Entity => {
                let app = require(context.app_id(), "application id")?;
                let id = require(context.entity_id(), "entity id")?;
                let lookup = match context.entity_id_prefix() {
                    Some(prefix) => {
                        Lookup::Key(schema::entity_key(cluster, app, entity_type, prefix, id))
                    }
                    None => Lookup::ScanForId {
                        prefix: RowKey::new(cluster).add(app).add(entity_type).into_prefix(),
                        id: id.to_string(),
                    },
                };
                (id, lookup)
            }
            TableKind::Application => {
                let (user, flow, run) = flow_run_scope(context)?;
                let app = require(context.app_id().or(context.entity_id()), "application id")?;
                (
                    app,
                    Lookup::Key(schema::application_key(cluster, user, flow, run, app)),
                )
            }
            TableKind::FlowRun => {
                let (user, flow, run) = flow_run_scope(context)?;
                let id = context.entity_id().unwrap_or_default();
                (id, Lookup::Key(schema::flow_run_key(cluster, user, flow, run)))
            }
            TableKind::FlowActivity => {
                return Err(ReaderError::invalid(
                    "flow activity does not support single entity reads",
                ))
            }
        };

        Ok(Self {
            kind,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            lookup,
            retrieval: retrieval.clone(),
        })
    }

    /// Table this reader reads from.
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Type of the requested entity.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Id of the requested entity, if the context carried one.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl SingleEntityReader for TableEntityReader {
    fn read_entity(
        &self,
        _config: &ConnectionConfig,
        conn: &dyn StorageConnection,
    ) -> ReaderResult<Option<TimelineEntity>> {
        let table = self.kind.table();
        let found = match &self.lookup {
            Lookup::Key(key) => conn
                .get(table, key)?
                .map(|row| schema::row_entity(&row))
                .transpose()?,
            Lookup::ScanForId { prefix, id } => {
                let scan = Scan::prefix(prefix.clone()).with_column(ENTITY_COLUMN);
                let mut found = None;
                for row in conn.scan(table, &scan)? {
                    let entity = schema::row_entity(&row)?;
                    if entity.id == *id {
                        found = Some(entity);
                        break;
                    }
                }
                found
            }
        };
        debug!(table, found = found.is_some(), "single entity read");
        Ok(found.map(|entity| self.retrieval.project(entity)))
    }
}

/// Reads a filtered collection from the table selected by the entity type.
#[derive(Debug, Clone)]
pub struct TableCollectionReader {
    kind: TableKind,
    prefix: Vec<u8>,
    filters: EntityFilters,
    retrieval: RetrievalSpec,
}

impl TableCollectionReader {
    /// Builds a reader for the collection scoped by `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidRequest`] if the filters are
    /// unsatisfiable or `context` lacks the scope fields the table needs.
    pub fn new(
        context: &ReadContext,
        filters: &EntityFilters,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<Self> {
        filters.validate()?;
        let cluster = require_cluster(context)?;
        let entity_type = require(context.entity_type(), "entity type")?;
        let kind = TableKind::for_type(&crate::entity::EntityType::parse(entity_type));

        let prefix = match kind {
            TableKind::Entity => {
                let app = require(context.app_id(), "application id")?;
                RowKey::new(cluster).add(app).add(entity_type).into_prefix()
            }
            TableKind::Application => {
                let user = require(context.user_id(), "user id")?;
                let flow = require(context.flow_name(), "flow name")?;
                let key = RowKey::new(cluster).add(user).add(flow);
                match context.flow_run_id() {
                    Some(run) => key.add_inverted(run).into_prefix(),
                    None => key.into_prefix(),
                }
            }
            TableKind::FlowRun => {
                let user = require(context.user_id(), "user id")?;
                let flow = require(context.flow_name(), "flow name")?;
                RowKey::new(cluster).add(user).add(flow).into_prefix()
            }
            TableKind::FlowActivity => RowKey::new(cluster).into_prefix(),
        };

        Ok(Self {
            kind,
            prefix,
            filters: filters.clone(),
            retrieval: retrieval.clone(),
        })
    }

    /// Table this reader reads from.
    pub fn kind(&self) -> TableKind {
        self.kind
    }
}

impl MultiEntityReader for TableCollectionReader {
    fn read_entities(
        &self,
        _config: &ConnectionConfig,
        conn: &dyn StorageConnection,
    ) -> ReaderResult<EntitySet> {
        let table = self.kind.table();
        let mut scan = Scan::prefix(self.prefix.clone()).with_column(ENTITY_COLUMN);
        if !self.filters.has_predicates() {
            scan = scan.with_limit(self.filters.limit);
        }
        let rows = conn.scan(table, &scan)?;

        let mut entities = EntitySet::new();
        let mut started = self.filters.from_id.is_none();
        for row in &rows {
            let entity = schema::row_entity(row)?;
            if !started {
                if self.filters.from_id.as_deref() != Some(entity.id.as_str()) {
                    continue;
                }
                started = true;
            }
            if !self.filters.matches(&entity) {
                continue;
            }
            entities.insert(self.retrieval.project(entity));
            if entities.len() >= self.filters.limit {
                break;
            }
        }

        debug!(
            table,
            scanned = rows.len(),
            returned = entities.len(),
            "collection read"
        );
        Ok(entities)
    }
}

fn require_cluster(context: &ReadContext) -> ReaderResult<&str> {
    if context.cluster_id().is_empty() {
        return Err(ReaderError::invalid("cluster id is required"));
    }
    Ok(context.cluster_id())
}

fn require<'a>(value: Option<&'a str>, what: &str) -> ReaderResult<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ReaderError::invalid(format!("{what} is required"))),
    }
}

fn flow_run_scope(context: &ReadContext) -> ReaderResult<(&str, &str, u64)> {
    let user = require(context.user_id(), "user id")?;
    let flow = require(context.flow_name(), "flow name")?;
    let run = match context.flow_run_id() {
        Some(run) => run,
        None => require(context.entity_id(), "flow run id")?
            .parse::<u64>()
            .map_err(|_| ReaderError::invalid("flow run id must be numeric"))?,
    };
    Ok((user, flow, run))
}
