//! Property-based test generators using proptest.

use proptest::prelude::*;
use tlreader_core::TimelineEntity;

/// Strategy for sequences of probe outcomes; `true` means the probe passed.
pub fn probe_script_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..32)
}

/// Strategy for entity ids, including characters the row-key codec escapes.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9_!%]{1,16}").expect("Invalid regex")
}

/// Strategy for entities of `entity_type` with distinct ids.
pub fn entities_strategy(
    entity_type: &'static str,
    max: usize,
) -> impl Strategy<Value = Vec<TimelineEntity>> {
    prop::collection::btree_set(entity_id_strategy(), 1..=max.max(1)).prop_map(move |ids| {
        ids.into_iter()
            .enumerate()
            .map(|(i, id)| TimelineEntity::new(entity_type, id).with_created_time(i as i64))
            .collect()
    })
}
