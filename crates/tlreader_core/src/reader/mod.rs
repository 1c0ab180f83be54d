//! Reader strategies.
//!
//! A strategy turns one logical request into storage `get`s and `scan`s and
//! decodes the result. Strategies are built per request by a
//! [`ReaderFactory`], which validates the request before returning, so a
//! malformed request never reaches the connection.
//!
//! Strategies receive the connection and its configuration by reference and
//! must not close or otherwise mutate them.

mod entity_types;
mod table;

pub use entity_types::TableEntityTypeReader;
pub use table::{TableCollectionReader, TableEntityReader};

use crate::context::ReadContext;
use crate::entity::{EntitySet, EntityType, TimelineEntity};
use crate::error::ReaderResult;
use crate::filters::{EntityFilters, RetrievalSpec};
use crate::schema;
use std::collections::BTreeSet;
use tlreader_storage::{ConnectionConfig, StorageConnection};

/// Reads one entity.
pub trait SingleEntityReader: Send + Sync {
    /// Executes the read. `Ok(None)` means the entity does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReaderError::Io`] if the backend fails.
    fn read_entity(
        &self,
        config: &ConnectionConfig,
        conn: &dyn StorageConnection,
    ) -> ReaderResult<Option<TimelineEntity>>;
}

/// Reads a filtered collection of entities.
pub trait MultiEntityReader: Send + Sync {
    /// Executes the read.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReaderError::Io`] if the backend fails.
    fn read_entities(
        &self,
        config: &ConnectionConfig,
        conn: &dyn StorageConnection,
    ) -> ReaderResult<EntitySet>;
}

/// Enumerates the entity types present in a scope.
pub trait EntityTypeReader: Send + Sync {
    /// Executes the read.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReaderError::Io`] if the backend fails.
    fn read_entity_types(
        &self,
        config: &ConnectionConfig,
        conn: &dyn StorageConnection,
    ) -> ReaderResult<BTreeSet<String>>;
}

/// Builds validated reader strategies.
pub trait ReaderFactory: Send + Sync {
    /// Builds a single-entity strategy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReaderError::InvalidRequest`] if `context` lacks the
    /// fields the entity type needs.
    fn single_entity_reader(
        &self,
        context: &ReadContext,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<Box<dyn SingleEntityReader>>;

    /// Builds a collection strategy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReaderError::InvalidRequest`] if `context` lacks the
    /// fields the entity type needs.
    fn multi_entity_reader(
        &self,
        context: &ReadContext,
        filters: &EntityFilters,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<Box<dyn MultiEntityReader>>;

    /// Builds an entity-type strategy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReaderError::InvalidRequest`] if `context` lacks a
    /// cluster or application.
    fn entity_type_reader(&self, context: &ReadContext)
        -> ReaderResult<Box<dyn EntityTypeReader>>;
}

/// The table an entity type lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Generic entities.
    Entity,
    /// Applications.
    Application,
    /// Flow runs.
    FlowRun,
    /// Flow activity.
    FlowActivity,
}

impl TableKind {
    /// Selects the table for an entity type.
    pub fn for_type(entity_type: &EntityType) -> Self {
        match entity_type {
            EntityType::FlowActivity => TableKind::FlowActivity,
            EntityType::FlowRun => TableKind::FlowRun,
            EntityType::Application => TableKind::Application,
            EntityType::Generic(_) => TableKind::Entity,
        }
    }

    /// Table name.
    pub fn table(self) -> &'static str {
        match self {
            TableKind::Entity => schema::ENTITY_TABLE,
            TableKind::Application => schema::APPLICATION_TABLE,
            TableKind::FlowRun => schema::FLOW_RUN_TABLE,
            TableKind::FlowActivity => schema::FLOW_ACTIVITY_TABLE,
        }
    }
}

/// The default factory: strategies over the tables in [`crate::schema`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TableReaderFactory;

impl ReaderFactory for TableReaderFactory {
    fn single_entity_reader(
        &self,
        context: &ReadContext,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<Box<dyn SingleEntityReader>> {
        Ok(Box::new(TableEntityReader::single(context, retrieval)?))
    }

    fn multi_entity_reader(
        &self,
        context: &ReadContext,
        filters: &EntityFilters,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<Box<dyn MultiEntityReader>> {
        Ok(Box::new(TableCollectionReader::new(
            context, filters, retrieval,
        )?))
    }

    fn entity_type_reader(
        &self,
        context: &ReadContext,
    ) -> ReaderResult<Box<dyn EntityTypeReader>> {
        Ok(Box::new(TableEntityTypeReader::new(context)?))
    }
}
