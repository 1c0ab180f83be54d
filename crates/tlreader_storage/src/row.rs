//! Rows, cells and scan descriptions.

use std::collections::BTreeMap;

/// A single row of a columnar table.
///
/// Columns are addressed as `family:qualifier` strings; values are opaque
/// bytes. The storage layer never interprets cell contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// Row key.
    pub key: Vec<u8>,
    /// Cells keyed by column name.
    pub cells: BTreeMap<String, Vec<u8>>,
}

impl Row {
    /// Creates an empty row with the given key.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Adds a cell, replacing any previous value for the column.
    #[must_use]
    pub fn with_cell(mut self, column: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    /// Returns the value of a column.
    pub fn cell(&self, column: &str) -> Option<&[u8]> {
        self.cells.get(column).map(Vec::as_slice)
    }
}

/// A prefix scan over a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Only rows whose key starts with this prefix are returned.
    pub prefix: Vec<u8>,
    /// Rows with keys strictly less than this are skipped.
    pub start_after: Option<Vec<u8>>,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
    /// Columns to return; empty means all columns.
    pub columns: Vec<String>,
}

impl Scan {
    /// Creates a scan over all rows sharing `prefix`.
    pub fn prefix(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Limits the number of returned rows.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resumes the scan strictly after `key`.
    #[must_use]
    pub fn with_start_after(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.start_after = Some(key.into());
        self
    }

    /// Restricts the returned columns.
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Returns true if `key` falls inside this scan's range.
    pub fn matches(&self, key: &[u8]) -> bool {
        if !key.starts_with(&self.prefix) {
            return false;
        }
        match &self.start_after {
            Some(after) => key > after.as_slice(),
            None => true,
        }
    }

    /// Projects a row onto the requested columns.
    pub fn project(&self, row: &Row) -> Row {
        if self.columns.is_empty() {
            return row.clone();
        }
        let cells = row
            .cells
            .iter()
            .filter(|(column, _)| self.columns.iter().any(|c| c == *column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        Row {
            key: row.key.clone(),
            cells,
        }
    }
}
