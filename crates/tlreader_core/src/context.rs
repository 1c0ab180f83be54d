//! Read contexts: what a request is scoped to.

use crate::entity::{type_names, EntityType};

/// Identifies what is being read.
///
/// A context is built once per request with [`ReadContextBuilder`] and never
/// changes afterwards. Which fields are required depends on the operation
/// and entity type; readers validate them before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadContext {
    cluster_id: String,
    user_id: Option<String>,
    flow_name: Option<String>,
    flow_run_id: Option<u64>,
    app_id: Option<String>,
    entity_type: Option<String>,
    entity_id_prefix: Option<i64>,
    entity_id: Option<String>,
    do_as_user: Option<String>,
}

impl ReadContext {
    /// Starts building a context for `cluster_id`.
    pub fn builder(cluster_id: impl Into<String>) -> ReadContextBuilder {
        ReadContextBuilder {
            context: ReadContext {
                cluster_id: cluster_id.into(),
                user_id: None,
                flow_name: None,
                flow_run_id: None,
                app_id: None,
                entity_type: None,
                entity_id_prefix: None,
                entity_id: None,
                do_as_user: None,
            },
        }
    }

    /// The sentinel scope queried by the liveness probe: the flow-activity
    /// records of `cluster_id`, which always exist and are cheap to scan.
    pub fn liveness_probe(cluster_id: impl Into<String>) -> Self {
        Self::builder(cluster_id)
            .entity_type(type_names::FLOW_ACTIVITY)
            .build()
    }

    /// Cluster id.
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// User id.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Flow name.
    pub fn flow_name(&self) -> Option<&str> {
        self.flow_name.as_deref()
    }

    /// Flow run id.
    pub fn flow_run_id(&self) -> Option<u64> {
        self.flow_run_id
    }

    /// Application id.
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Entity type name.
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    /// Parsed entity type.
    pub fn kind(&self) -> Option<EntityType> {
        self.entity_type.as_deref().map(EntityType::parse)
    }

    /// Entity id prefix.
    pub fn entity_id_prefix(&self) -> Option<i64> {
        self.entity_id_prefix
    }

    /// Entity id.
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// User the request is made on behalf of.
    pub fn do_as_user(&self) -> Option<&str> {
        self.do_as_user.as_deref()
    }
}

/// Builder for [`ReadContext`].
#[derive(Debug, Clone)]
pub struct ReadContextBuilder {
    context: ReadContext,
}

impl ReadContextBuilder {
    /// Sets the user id.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.context.user_id = Some(user_id.into());
        self
    }

    /// Sets the flow name.
    #[must_use]
    pub fn flow_name(mut self, flow_name: impl Into<String>) -> Self {
        self.context.flow_name = Some(flow_name.into());
        self
    }

    /// Sets the flow run id.
    #[must_use]
    pub fn flow_run_id(mut self, flow_run_id: u64) -> Self {
        self.context.flow_run_id = Some(flow_run_id);
        self
    }

    /// Sets the application id.
    #[must_use]
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.context.app_id = Some(app_id.into());
        self
    }

    /// Sets the entity type name.
    #[must_use]
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.context.entity_type = Some(entity_type.into());
        self
    }

    /// Sets the entity id prefix.
    #[must_use]
    pub fn entity_id_prefix(mut self, prefix: i64) -> Self {
        self.context.entity_id_prefix = Some(prefix);
        self
    }

    /// Sets the entity id.
    #[must_use]
    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.context.entity_id = Some(entity_id.into());
        self
    }

    /// Sets the user the request is made on behalf of.
    #[must_use]
    pub fn do_as_user(mut self, user: impl Into<String>) -> Self {
        self.context.do_as_user = Some(user.into());
        self
    }

    /// Finishes the context.
    pub fn build(self) -> ReadContext {
        self.context
    }
}
