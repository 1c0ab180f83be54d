//! Table layout, row keys and the entity cell codec.
//!
//! Row keys are `!`-separated components. Each component is escaped
//! (`%` -> `%25`, `!` -> `%21`) so a key prefix built from whole components
//! never matches a longer component by accident.
//!
//! | table | row key |
//! |---|---|
//! | [`ENTITY_TABLE`] | cluster!app!type!idprefix!id |
//! | [`APPLICATION_TABLE`] | cluster!user!flow!run!app |
//! | [`FLOW_RUN_TABLE`] | cluster!user!flow!run |
//! | [`FLOW_ACTIVITY_TABLE`] | cluster!day!user!flow |
//!
//! Run ids and days are stored inverted so the newest sort first; id
//! prefixes are stored sign-flipped so they sort numerically.

use crate::entity::TimelineEntity;
use crate::error::{ReaderError, ReaderResult};
use tlreader_storage::{Row, StorageError};

/// Generic entities, stored under their application.
pub const ENTITY_TABLE: &str = "timelineservice.entity";
/// Applications, stored under their flow run.
pub const APPLICATION_TABLE: &str = "timelineservice.application";
/// Flow runs.
pub const FLOW_RUN_TABLE: &str = "timelineservice.flowrun";
/// Daily flow activity.
pub const FLOW_ACTIVITY_TABLE: &str = "timelineservice.flowactivity";

/// Column holding the encoded entity.
pub const ENTITY_COLUMN: &str = "i:entity";

const SEPARATOR: u8 = b'!';
const MILLIS_PER_DAY: u64 = 86_400_000;

/// Incrementally builds a row key or a row key prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowKey {
    bytes: Vec<u8>,
}

impl RowKey {
    /// Starts a key with its first component.
    pub fn new(first: &str) -> Self {
        let mut key = Self::default();
        key.push_escaped(first);
        key
    }

    /// Appends a string component.
    #[must_use]
    pub fn add(mut self, component: &str) -> Self {
        self.bytes.push(SEPARATOR);
        self.push_escaped(component);
        self
    }

    /// Appends an id prefix so that keys sort by numeric prefix.
    #[must_use]
    pub fn add_id_prefix(self, prefix: i64) -> Self {
        let flipped = (prefix as u64) ^ (1 << 63);
        self.add(&format!("{flipped:016x}"))
    }

    /// Appends a run id so that newer (larger) runs sort first.
    #[must_use]
    pub fn add_inverted(self, value: u64) -> Self {
        self.add(&format!("{:020}", u64::MAX - value))
    }

    /// Appends the day containing `timestamp_ms`, newest day first.
    #[must_use]
    pub fn add_day(self, timestamp_ms: u64) -> Self {
        self.add_inverted(timestamp_ms - timestamp_ms % MILLIS_PER_DAY)
    }

    /// Returns the key as a scan prefix covering every longer key.
    pub fn into_prefix(mut self) -> Vec<u8> {
        self.bytes.push(SEPARATOR);
        self.bytes
    }

    /// Returns the complete key.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn push_escaped(&mut self, component: &str) {
        for byte in component.bytes() {
            match byte {
                b'%' => self.bytes.extend_from_slice(b"%25"),
                SEPARATOR => self.bytes.extend_from_slice(b"%21"),
                other => self.bytes.push(other),
            }
        }
    }
}

/// Splits a row key into its unescaped components.
///
/// # Errors
///
/// Returns an I/O failure wrapping [`StorageError::Corrupted`] if the key is
/// not valid UTF-8 or contains a malformed escape.
pub fn split_row_key(key: &[u8]) -> ReaderResult<Vec<String>> {
    key.split(|b| *b == SEPARATOR).map(unescape).collect()
}

fn unescape(component: &[u8]) -> ReaderResult<String> {
    let mut out = Vec::with_capacity(component.len());
    let mut i = 0;
    while i < component.len() {
        if component[i] == b'%' {
            match component.get(i + 1..i + 3) {
                Some(b"25") => out.push(b'%'),
                Some(b"21") => out.push(SEPARATOR),
                _ => return Err(corrupted("malformed escape in row key")),
            }
            i += 3;
        } else {
            out.push(component[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| corrupted("row key is not UTF-8"))
}

/// Key of a generic entity.
pub fn entity_key(
    cluster: &str,
    app: &str,
    entity_type: &str,
    id_prefix: i64,
    id: &str,
) -> Vec<u8> {
    RowKey::new(cluster)
        .add(app)
        .add(entity_type)
        .add_id_prefix(id_prefix)
        .add(id)
        .into_bytes()
}

/// Key of an application.
pub fn application_key(cluster: &str, user: &str, flow: &str, run: u64, app: &str) -> Vec<u8> {
    RowKey::new(cluster)
        .add(user)
        .add(flow)
        .add_inverted(run)
        .add(app)
        .into_bytes()
}

/// Key of a flow run.
pub fn flow_run_key(cluster: &str, user: &str, flow: &str, run: u64) -> Vec<u8> {
    RowKey::new(cluster)
        .add(user)
        .add(flow)
        .add_inverted(run)
        .into_bytes()
}

/// Key of a flow activity record.
pub fn flow_activity_key(cluster: &str, day_ms: u64, user: &str, flow: &str) -> Vec<u8> {
    RowKey::new(cluster)
        .add_day(day_ms)
        .add(user)
        .add(flow)
        .into_bytes()
}

/// Encodes an entity into its cell value.
///
/// # Errors
///
/// Returns an I/O failure if serialization fails.
pub fn encode_entity(entity: &TimelineEntity) -> ReaderResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(entity, &mut buf)
        .map_err(|e| corrupted(format!("failed to encode entity {}: {e}", entity.id)))?;
    Ok(buf)
}

/// Decodes an entity cell value.
///
/// # Errors
///
/// Returns an I/O failure wrapping [`StorageError::Corrupted`] if the cell
/// cannot be decoded.
pub fn decode_entity(bytes: &[u8]) -> ReaderResult<TimelineEntity> {
    ciborium::from_reader(bytes).map_err(|e| corrupted(format!("failed to decode entity: {e}")))
}

/// Builds the row that stores `entity` under `key`.
///
/// # Errors
///
/// Returns an I/O failure if the entity cannot be encoded.
pub fn entity_row(key: Vec<u8>, entity: &TimelineEntity) -> ReaderResult<Row> {
    Ok(Row::new(key).with_cell(ENTITY_COLUMN, encode_entity(entity)?))
}

/// Decodes the entity stored in `row`.
///
/// # Errors
///
/// Returns an I/O failure if the entity column is missing or malformed.
pub fn row_entity(row: &Row) -> ReaderResult<TimelineEntity> {
    let cell = row
        .cell(ENTITY_COLUMN)
        .ok_or_else(|| corrupted(format!("row {:?} has no {ENTITY_COLUMN}", row.key)))?;
    decode_entity(cell)
}

fn corrupted(message: impl Into<String>) -> ReaderError {
    ReaderError::Io(StorageError::Corrupted(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn escaped_components_do_not_leak_separators() {
        let key = RowKey::new("c!1").add("a%b").into_bytes();
        assert_eq!(key, b"c%211!a%25b".to_vec());
        assert_eq!(split_row_key(&key).unwrap(), vec!["c!1", "a%b"]);
    }

    #[test]
    fn prefix_does_not_match_longer_component() {
        let prefix = RowKey::new("c1").add("app_1").into_prefix();
        let same = entity_key("c1", "app_1", "T", 0, "x");
        let longer = entity_key("c1", "app_10", "T", 0, "x");
        assert!(same.starts_with(&prefix));
        assert!(!longer.starts_with(&prefix));
    }

    #[test]
    fn newer_runs_sort_first() {
        let old = flow_run_key("c", "u", "f", 100);
        let new = flow_run_key("c", "u", "f", 200);
        assert!(new < old);
    }

    #[test]
    fn newer_days_sort_first() {
        let day = 86_400_000;
        let yesterday = flow_activity_key("c", day * 10 + 5, "u", "f");
        let today = flow_activity_key("c", day * 11 + 7, "u", "f");
        assert!(today < yesterday);
        // Same day collapses to the same component
        assert_eq!(
            flow_activity_key("c", day * 11, "u", "f"),
            flow_activity_key("c", day * 11 + 999, "u", "f")
        );
    }

    #[test]
    fn malformed_escape_is_corruption() {
        let result = split_row_key(b"c1!bad%zz");
        assert!(matches!(
            result,
            Err(ReaderError::Io(StorageError::Corrupted(_)))
        ));
    }

    #[test]
    fn missing_entity_column_is_corruption() {
        let row = Row::new(b"k".to_vec()).with_cell("i:other", vec![0]);
        assert!(matches!(
            row_entity(&row),
            Err(ReaderError::Io(StorageError::Corrupted(_)))
        ));
    }

    #[test]
    fn entity_cell_keeps_all_sections() {
        let entity = TimelineEntity::new("YARN_CONTAINER", "c1")
            .with_id_prefix(-4)
            .with_created_time(9)
            .with_info("k", "v")
            .with_metric("cpu", 1, 2)
            .with_is_related_to("YARN_APPLICATION", "a1");
        let row = entity_row(b"k".to_vec(), &entity).unwrap();
        let decoded = row_entity(&row).unwrap();
        assert_eq!(decoded, entity);
        assert_eq!(decoded.info, entity.info);
        assert_eq!(decoded.metrics, entity.metrics);
        assert_eq!(decoded.is_related_to, entity.is_related_to);
    }

    proptest! {
        #[test]
        fn id_prefix_order_matches_key_order(a in any::<i64>(), b in any::<i64>()) {
            let ka = entity_key("c", "app", "T", a, "id");
            let kb = entity_key("c", "app", "T", b, "id");
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }
    }
}
