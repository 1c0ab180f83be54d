//! A reader factory that records how often it is asked for strategies.

use std::sync::atomic::{AtomicUsize, Ordering};
use tlreader_core::reader::{EntityTypeReader, MultiEntityReader, SingleEntityReader};
use tlreader_core::{
    EntityFilters, ReadContext, ReaderFactory, ReaderResult, RetrievalSpec, TableReaderFactory,
};

/// Wraps a [`ReaderFactory`] and counts strategy requests.
///
/// A zero count after a rejected read proves the read never reached the
/// dispatch stage.
#[derive(Debug, Default)]
pub struct CountingFactory<F: ReaderFactory = TableReaderFactory> {
    inner: F,
    single: AtomicUsize,
    multi: AtomicUsize,
    types: AtomicUsize,
}

impl CountingFactory {
    /// Counts requests to the table factory.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: ReaderFactory> CountingFactory<F> {
    /// Counts requests to `inner`.
    pub fn wrap(inner: F) -> Self {
        Self {
            inner,
            single: AtomicUsize::new(0),
            multi: AtomicUsize::new(0),
            types: AtomicUsize::new(0),
        }
    }

    /// Total strategy requests.
    pub fn calls(&self) -> usize {
        self.single_calls() + self.multi_calls() + self.type_calls()
    }

    /// Single-entity strategy requests.
    pub fn single_calls(&self) -> usize {
        self.single.load(Ordering::SeqCst)
    }

    /// Collection strategy requests.
    pub fn multi_calls(&self) -> usize {
        self.multi.load(Ordering::SeqCst)
    }

    /// Entity-type strategy requests.
    pub fn type_calls(&self) -> usize {
        self.types.load(Ordering::SeqCst)
    }
}

impl<F: ReaderFactory> ReaderFactory for CountingFactory<F> {
    fn single_entity_reader(
        &self,
        context: &ReadContext,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<Box<dyn SingleEntityReader>> {
        self.single.fetch_add(1, Ordering::SeqCst);
        self.inner.single_entity_reader(context, retrieval)
    }

    fn multi_entity_reader(
        &self,
        context: &ReadContext,
        filters: &EntityFilters,
        retrieval: &RetrievalSpec,
    ) -> ReaderResult<Box<dyn MultiEntityReader>> {
        self.multi.fetch_add(1, Ordering::SeqCst);
        self.inner.multi_entity_reader(context, filters, retrieval)
    }

    fn entity_type_reader(
        &self,
        context: &ReadContext,
    ) -> ReaderResult<Box<dyn EntityTypeReader>> {
        self.types.fetch_add(1, Ordering::SeqCst);
        self.inner.entity_type_reader(context)
    }
}
