//! Timeline entities and entity types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Well-known entity type names.
pub mod type_names {
    /// Daily per-flow activity records.
    pub const FLOW_ACTIVITY: &str = "YARN_FLOW_ACTIVITY";
    /// Flow runs.
    pub const FLOW_RUN: &str = "YARN_FLOW_RUN";
    /// Applications.
    pub const APPLICATION: &str = "YARN_APPLICATION";
}

/// The type of a timeline entity.
///
/// The three well-known types live in dedicated tables; every other type
/// name is a generic entity stored under its application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    /// `YARN_FLOW_ACTIVITY`.
    FlowActivity,
    /// `YARN_FLOW_RUN`.
    FlowRun,
    /// `YARN_APPLICATION`.
    Application,
    /// Any other type name.
    Generic(String),
}

impl EntityType {
    /// Parses a type name. Unknown names become [`EntityType::Generic`].
    pub fn parse(name: &str) -> Self {
        match name {
            type_names::FLOW_ACTIVITY => EntityType::FlowActivity,
            type_names::FLOW_RUN => EntityType::FlowRun,
            type_names::APPLICATION => EntityType::Application,
            other => EntityType::Generic(other.to_string()),
        }
    }

    /// Returns the type name.
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::FlowActivity => type_names::FLOW_ACTIVITY,
            EntityType::FlowRun => type_names::FLOW_RUN,
            EntityType::Application => type_names::APPLICATION,
            EntityType::Generic(name) => name,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timeline entity as returned by readers.
///
/// Identity is `(entity_type, id_prefix, id)`. Equality, hashing and
/// ordering only look at identity, so two reads of the same entity with
/// different retrieval specs compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineEntity {
    /// Entity type name.
    pub entity_type: String,
    /// Entity id.
    pub id: String,
    /// Id prefix used to order entities of the same type.
    #[serde(default)]
    pub id_prefix: i64,
    /// Creation time in milliseconds since the epoch.
    #[serde(default)]
    pub created_time: Option<i64>,
    /// Free-form info.
    #[serde(default)]
    pub info: BTreeMap<String, String>,
    /// Configuration key/values.
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    /// Metric time series: name -> timestamp -> value.
    #[serde(default)]
    pub metrics: BTreeMap<String, BTreeMap<i64, i64>>,
    /// Entities this one relates to: type -> ids.
    #[serde(default)]
    pub relates_to: BTreeMap<String, BTreeSet<String>>,
    /// Entities related to this one: type -> ids.
    #[serde(default)]
    pub is_related_to: BTreeMap<String, BTreeSet<String>>,
}

impl TimelineEntity {
    /// Creates an entity with the given type and id.
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the id prefix.
    #[must_use]
    pub fn with_id_prefix(mut self, id_prefix: i64) -> Self {
        self.id_prefix = id_prefix;
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_time(mut self, created_time: i64) -> Self {
        self.created_time = Some(created_time);
        self
    }

    /// Adds an info entry.
    #[must_use]
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Adds a config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }

    /// Adds a metric point.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, timestamp: i64, value: i64) -> Self {
        self.metrics
            .entry(name.into())
            .or_default()
            .insert(timestamp, value);
        self
    }

    /// Records that this entity relates to another.
    #[must_use]
    pub fn with_relates_to(
        mut self,
        entity_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        self.relates_to
            .entry(entity_type.into())
            .or_default()
            .insert(id.into());
        self
    }

    /// Records that another entity is related to this one.
    #[must_use]
    pub fn with_is_related_to(
        mut self,
        entity_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        self.is_related_to
            .entry(entity_type.into())
            .or_default()
            .insert(id.into());
        self
    }

    /// Returns the parsed entity type.
    pub fn kind(&self) -> EntityType {
        EntityType::parse(&self.entity_type)
    }

    /// Returns the identity key.
    pub fn identity(&self) -> EntityIdentity {
        EntityIdentity {
            entity_type: self.entity_type.clone(),
            id_prefix: self.id_prefix,
            id: self.id.clone(),
        }
    }

    /// Latest value of a metric, if any points exist.
    pub fn latest_metric(&self, name: &str) -> Option<i64> {
        self.metrics
            .get(name)
            .and_then(|points| points.iter().next_back())
            .map(|(_, value)| *value)
    }
}

impl PartialEq for TimelineEntity {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type
            && self.id_prefix == other.id_prefix
            && self.id == other.id
    }
}

impl Eq for TimelineEntity {}

impl Hash for TimelineEntity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_type.hash(state);
        self.id_prefix.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for TimelineEntity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimelineEntity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entity_type
            .cmp(&other.entity_type)
            .then(self.id_prefix.cmp(&other.id_prefix))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Identity of a timeline entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIdentity {
    /// Entity type name.
    pub entity_type: String,
    /// Id prefix.
    pub id_prefix: i64,
    /// Entity id.
    pub id: String,
}

/// An insertion-ordered set of entities without duplicate identities.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    entities: Vec<TimelineEntity>,
    seen: HashSet<EntityIdentity>,
}

impl EntitySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entity. Returns false if its identity was already present.
    pub fn insert(&mut self, entity: TimelineEntity) -> bool {
        if !self.seen.insert(entity.identity()) {
            return false;
        }
        self.entities.push(entity);
        true
    }

    /// Returns true if an entity with this identity is present.
    pub fn contains(&self, entity: &TimelineEntity) -> bool {
        self.seen.contains(&entity.identity())
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, TimelineEntity> {
        self.entities.iter()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.id.as_str()).collect()
    }

    /// Consumes the set, returning entities in insertion order.
    pub fn into_vec(self) -> Vec<TimelineEntity> {
        self.entities
    }
}

impl PartialEq for EntitySet {
    fn eq(&self, other: &Self) -> bool {
        self.seen == other.seen
    }
}

impl Eq for EntitySet {}

impl FromIterator<TimelineEntity> for EntitySet {
    fn from_iter<I: IntoIterator<Item = TimelineEntity>>(iter: I) -> Self {
        let mut set = EntitySet::new();
        for entity in iter {
            set.insert(entity);
        }
        set
    }
}

impl IntoIterator for EntitySet {
    type Item = TimelineEntity;
    type IntoIter = std::vec::IntoIter<TimelineEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = &'a TimelineEntity;
    type IntoIter = std::slice::Iter<'a, TimelineEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
