//! Collection filters and retrieval specs.

use crate::entity::TimelineEntity;
use crate::error::{ReaderError, ReaderResult};
use std::collections::{BTreeMap, BTreeSet};

/// Default number of entities returned by a collection read.
pub const DEFAULT_ENTITY_LIMIT: usize = 100;

/// Comparison used by metric filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Applies the comparison.
    pub fn apply(self, left: i64, right: i64) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::NotEq => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

/// Compares the latest value of a metric against a constant.
///
/// Entities without the metric never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFilter {
    /// Metric name.
    pub name: String,
    /// Comparison.
    pub op: CompareOp,
    /// Right-hand side.
    pub value: i64,
}

/// Describes which entities a collection read returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFilters {
    /// Maximum number of entities.
    pub limit: usize,
    /// Inclusive lower bound on creation time.
    pub created_time_begin: i64,
    /// Inclusive upper bound on creation time.
    pub created_time_end: i64,
    /// Start from the entity with this id (inclusive).
    pub from_id: Option<String>,
    /// Required info key/values.
    pub info_filters: BTreeMap<String, String>,
    /// Required config key/values.
    pub config_filters: BTreeMap<String, String>,
    /// Metric comparisons, all of which must hold.
    pub metric_filters: Vec<MetricFilter>,
}

impl EntityFilters {
    /// Creates filters that match everything, up to the default limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Restricts creation time to `[begin, end]`.
    #[must_use]
    pub fn with_created_time(mut self, begin: i64, end: i64) -> Self {
        self.created_time_begin = begin;
        self.created_time_end = end;
        self
    }

    /// Starts from the given id, inclusive.
    #[must_use]
    pub fn with_from_id(mut self, id: impl Into<String>) -> Self {
        self.from_id = Some(id.into());
        self
    }

    /// Requires an info entry.
    #[must_use]
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info_filters.insert(key.into(), value.into());
        self
    }

    /// Requires a config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_filters.insert(key.into(), value.into());
        self
    }

    /// Adds a metric comparison.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, op: CompareOp, value: i64) -> Self {
        self.metric_filters.push(MetricFilter {
            name: name.into(),
            op,
            value,
        });
        self
    }

    /// Rejects filters that can never be satisfied.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidRequest`] for a zero limit or an
    /// inverted creation-time range.
    pub fn validate(&self) -> ReaderResult<()> {
        if self.limit == 0 {
            return Err(ReaderError::invalid("entity limit must be positive"));
        }
        if self.created_time_begin > self.created_time_end {
            return Err(ReaderError::invalid(format!(
                "created time range is inverted: {} > {}",
                self.created_time_begin, self.created_time_end
            )));
        }
        Ok(())
    }

    /// Returns true if anything other than `limit` narrows the result, in
    /// which case the limit cannot be pushed down to the scan.
    pub fn has_predicates(&self) -> bool {
        self.from_id.is_some()
            || self.created_time_begin > 0
            || self.created_time_end < i64::MAX
            || !self.info_filters.is_empty()
            || !self.config_filters.is_empty()
            || !self.metric_filters.is_empty()
    }

    /// Returns true if `entity` passes every filter except `limit`/`from_id`.
    pub fn matches(&self, entity: &TimelineEntity) -> bool {
        if let Some(created) = entity.created_time {
            if created < self.created_time_begin || created > self.created_time_end {
                return false;
            }
        } else if self.created_time_begin > 0 || self.created_time_end < i64::MAX {
            return false;
        }

        let info_ok = self
            .info_filters
            .iter()
            .all(|(k, v)| entity.info.get(k) == Some(v));
        let config_ok = self
            .config_filters
            .iter()
            .all(|(k, v)| entity.configs.get(k) == Some(v));
        let metrics_ok = self.metric_filters.iter().all(|filter| {
            entity
                .latest_metric(&filter.name)
                .is_some_and(|latest| filter.op.apply(latest, filter.value))
        });

        info_ok && config_ok && metrics_ok
    }
}

impl Default for EntityFilters {
    fn default() -> Self {
        Self {
            limit: DEFAULT_ENTITY_LIMIT,
            created_time_begin: 0,
            created_time_end: i64::MAX,
            from_id: None,
            info_filters: BTreeMap::new(),
            config_filters: BTreeMap::new(),
            metric_filters: Vec::new(),
        }
    }
}

/// Optional sections of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    /// Info map.
    Info,
    /// Config map.
    Configs,
    /// Metric series.
    Metrics,
    /// Outgoing relations.
    RelatesTo,
    /// Incoming relations.
    IsRelatedTo,
}

impl Field {
    /// Every field.
    pub const ALL: [Field; 5] = [
        Field::Info,
        Field::Configs,
        Field::Metrics,
        Field::RelatesTo,
        Field::IsRelatedTo,
    ];
}

/// Describes which parts of each entity to return.
///
/// Identity and creation time are always returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalSpec {
    /// Sections to return.
    pub fields: BTreeSet<Field>,
    /// If non-empty, only configs whose key starts with one of these.
    pub config_prefixes: Vec<String>,
    /// If non-empty, only metrics whose name starts with one of these.
    pub metric_prefixes: Vec<String>,
    /// Keep at most this many most-recent points per metric.
    pub metrics_limit: Option<usize>,
}

impl RetrievalSpec {
    /// Identity and creation time only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every section.
    #[must_use]
    pub fn all() -> Self {
        Self {
            fields: Field::ALL.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Adds a section.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.insert(field);
        self
    }

    /// Restricts configs to keys with this prefix. Implies [`Field::Configs`].
    #[must_use]
    pub fn with_config_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fields.insert(Field::Configs);
        self.config_prefixes.push(prefix.into());
        self
    }

    /// Restricts metrics to names with this prefix. Implies [`Field::Metrics`].
    #[must_use]
    pub fn with_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fields.insert(Field::Metrics);
        self.metric_prefixes.push(prefix.into());
        self
    }

    /// Keeps at most `limit` recent points per metric.
    #[must_use]
    pub fn with_metrics_limit(mut self, limit: usize) -> Self {
        self.metrics_limit = Some(limit);
        self
    }

    /// Returns true if `field` is requested.
    pub fn wants(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    /// Strips everything not requested from `entity`.
    pub fn project(&self, mut entity: TimelineEntity) -> TimelineEntity {
        if !self.wants(Field::Info) {
            entity.info.clear();
        }
        if !self.wants(Field::Configs) {
            entity.configs.clear();
        } else if !self.config_prefixes.is_empty() {
            entity
                .configs
                .retain(|key, _| starts_with_any(key, &self.config_prefixes));
        }
        if !self.wants(Field::Metrics) {
            entity.metrics.clear();
        } else {
            if !self.metric_prefixes.is_empty() {
                entity
                    .metrics
                    .retain(|name, _| starts_with_any(name, &self.metric_prefixes));
            }
            if let Some(limit) = self.metrics_limit {
                for points in entity.metrics.values_mut() {
                    while points.len() > limit {
                        points.pop_first();
                    }
                }
            }
        }
        if !self.wants(Field::RelatesTo) {
            entity.relates_to.clear();
        }
        if !self.wants(Field::IsRelatedTo) {
            entity.is_related_to.clear();
        }
        entity
    }
}

fn starts_with_any(value: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| value.starts_with(p.as_str()))
}
