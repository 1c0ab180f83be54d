//! Liveness probes.

use crate::config::ReaderConfig;
use crate::context::ReadContext;
use crate::dispatcher::ReaderDispatcher;
use crate::error::ReaderResult;
use crate::filters::{EntityFilters, RetrievalSpec};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tlreader_storage::{ConnectionConfig, Connector, StorageConnection};

/// A lightweight reachability check against storage.
///
/// Implementations own whatever connection they probe over and release it
/// in [`StorageProbe::close`].
pub trait StorageProbe: Send + Sync {
    /// Runs one probe. `Ok(())` means storage answered.
    ///
    /// # Errors
    ///
    /// Returns any error that shows storage is unreachable.
    fn probe(&self) -> ReaderResult<()>;

    /// Releases the probe's resources. Called once, after the last probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying connection fails to close.
    fn close(&self) -> ReaderResult<()>;
}

impl<P: StorageProbe + ?Sized> StorageProbe for Arc<P> {
    fn probe(&self) -> ReaderResult<()> {
        (**self).probe()
    }

    fn close(&self) -> ReaderResult<()> {
        (**self).close()
    }
}

/// Probes storage by reading one flow-activity record of the cluster.
///
/// The read goes through the regular reader path over a dedicated
/// connection, opened with [`ReaderConfig::probe_connection_config`] so a
/// dead backend fails within roughly one monitor interval.
pub struct TableProbe {
    context: ReadContext,
    config: ConnectionConfig,
    connection: Box<dyn StorageConnection>,
    dispatcher: ReaderDispatcher,
    closed: AtomicBool,
}

impl TableProbe {
    /// Opens the probe connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReaderError::Io`] if the connection cannot be opened.
    pub fn connect(connector: &dyn Connector, config: &ReaderConfig) -> ReaderResult<Self> {
        let probe_config = config.probe_connection_config();
        let connection = connector.open(&probe_config)?;
        Ok(Self {
            context: ReadContext::liveness_probe(config.cluster_id.clone()),
            config: probe_config,
            connection,
            dispatcher: ReaderDispatcher::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Configuration of the probe connection.
    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl StorageProbe for TableProbe {
    fn probe(&self) -> ReaderResult<()> {
        self.dispatcher.read_entity_collection(
            &self.config,
            self.connection.as_ref(),
            &self.context,
            &EntityFilters::new().with_limit(1),
            &RetrievalSpec::new(),
        )?;
        Ok(())
    }

    fn close(&self) -> ReaderResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.connection.close()?;
        Ok(())
    }
}

impl std::fmt::Debug for TableProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableProbe")
            .field("cluster_id", &self.context.cluster_id())
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
