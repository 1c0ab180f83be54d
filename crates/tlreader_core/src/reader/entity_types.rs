use super::EntityTypeReader;
use crate::context::ReadContext;
use crate::error::{ReaderError, ReaderResult};
use crate::schema::{self, RowKey};
use std::collections::BTreeSet;
use tlreader_storage::{ConnectionConfig, Scan, StorageConnection};

/// Lists the generic entity types stored under one application.
///
/// Only row keys are inspected; entity cells are never decoded.
#[derive(Debug, Clone)]
pub struct TableEntityTypeReader {
    prefix: Vec<u8>,
}

impl TableEntityTypeReader {
    /// Builds a reader scoped to the application in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidRequest`] if the cluster or application
    /// is missing.
    pub fn new(context: &ReadContext) -> ReaderResult<Self> {
        if context.cluster_id().is_empty() {
            return Err(ReaderError::invalid("cluster id is required"));
        }
        let app = match context.app_id() {
            Some(app) if !app.is_empty() => app,
            _ => return Err(ReaderError::invalid("application id is required")),
        };
        Ok(Self {
            prefix: RowKey::new(context.cluster_id()).add(app).into_prefix(),
        })
    }
}

impl EntityTypeReader for TableEntityTypeReader {
    fn read_entity_types(
        &self,
        _config: &ConnectionConfig,
        conn: &dyn StorageConnection,
    ) -> ReaderResult<BTreeSet<String>> {
        let rows = conn.scan(schema::ENTITY_TABLE, &Scan::prefix(self.prefix.clone()))?;
        let mut types = BTreeSet::new();
        for row in rows {
            let mut parts = schema::split_row_key(&row.key)?;
            if parts.len() < 3 {
                continue;
            }
            types.insert(parts.swap_remove(2));
        }
        Ok(types)
    }
}
