//! Queue record processing

pub mod batch;
pub mod claim;
pub mod process;

use std::sync::Arc;

use mailrelay_common::internal;
use mailrelay_ledger::Ledger;

use crate::{
    error::ProcessingError, object::ObjectStore, queue::QueueStore, resolver::Resolver,
    rewrite::Rewriter, transport::MailTransport,
};

pub const fn default_max_concurrent_records() -> usize {
    10
}

/// Forwards the raw messages announced by queue records, at most once per
/// queue message id.
///
/// For each record the forwarder claims the message id in the ledger, fetches
/// the raw message, resolves its recipients, rewrites it and dispatches it.
/// Only once the dispatch succeeded is the ledger entry completed and the
/// record deleted from the queue. Any failure leaves the record on the queue
/// and the ledger entry `IN_PROGRESS`, so a redelivery after the processing
/// timeout reclaims it.
///
/// Collaborators are injected through [`Forwarder::builder`].
#[derive(Debug, Clone)]
pub struct Forwarder {
    pub(crate) ledger: Ledger,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) resolver: Resolver,
    pub(crate) rewriter: Rewriter,
    pub(crate) transport: Arc<dyn MailTransport>,
    pub(crate) queue: Arc<dyn QueueStore>,
    pub(crate) max_concurrent_records: usize,
}

impl Forwarder {
    pub fn builder() -> ForwarderBuilder {
        ForwarderBuilder::default()
    }

    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub const fn max_concurrent_records(&self) -> usize {
        self.max_concurrent_records
    }
}

#[derive(Debug, Default)]
pub struct ForwarderBuilder {
    ledger: Option<Ledger>,
    objects: Option<Arc<dyn ObjectStore>>,
    resolver: Option<Resolver>,
    rewriter: Option<Rewriter>,
    transport: Option<Arc<dyn MailTransport>>,
    queue: Option<Arc<dyn QueueStore>>,
    max_concurrent_records: Option<usize>,
}

impl ForwarderBuilder {
    #[must_use]
    pub fn ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn rewriter(mut self, rewriter: Rewriter) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn queue(mut self, queue: Arc<dyn QueueStore>) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub const fn max_concurrent_records(mut self, max: usize) -> Self {
        self.max_concurrent_records = Some(max);
        self
    }

    /// # Errors
    /// [`ProcessingError::NotConfigured`] naming the first missing collaborator
    pub fn build(self) -> Result<Forwarder, ProcessingError> {
        let forwarder = Forwarder {
            ledger: self.ledger.ok_or(ProcessingError::NotConfigured("ledger"))?,
            objects: self
                .objects
                .ok_or(ProcessingError::NotConfigured("object store"))?,
            resolver: self
                .resolver
                .ok_or(ProcessingError::NotConfigured("resolver"))?,
            rewriter: self
                .rewriter
                .ok_or(ProcessingError::NotConfigured("rewriter"))?,
            transport: self
                .transport
                .ok_or(ProcessingError::NotConfigured("transport"))?,
            queue: self.queue.ok_or(ProcessingError::NotConfigured("queue"))?,
            max_concurrent_records: self
                .max_concurrent_records
                .unwrap_or_else(default_max_concurrent_records)
                .max(1),
        };

        internal!(
            "Forwarder ready: ledger={}, destinations={}, sender={}, timeout={}s, concurrency={}",
            forwarder.ledger.table(),
            forwarder.resolver.table(),
            forwarder.rewriter.sender(),
            forwarder.ledger.processing_timeout().as_secs(),
            forwarder.max_concurrent_records
        );

        Ok(forwarder)
    }
}
