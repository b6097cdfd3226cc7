use std::{sync::Arc, time::Duration};

use mailrelay_common::internal;
use mailrelay_delivery::{
    BatchReport, Delivered, Forwarder, MemoryQueue, QueueEvent, QueueRecord, QueueStore, Rewriter,
    StorageNotification,
};
use mailrelay_ledger::{Ledger, LedgerEntry, MessageId};
use tracing::warn;

use crate::config::Mailrelay;

/// Result of processing one queue event
#[derive(Debug)]
pub struct Processed {
    pub report: BatchReport,
    /// Records that were not acknowledged and should be handed back to the
    /// queue, in their original order
    pub unacknowledged: Vec<QueueRecord>,
}

/// Wires the configured collaborators together and runs the commands
#[derive(Debug, Clone)]
pub struct Controller {
    config: Mailrelay,
}

impl Controller {
    pub const fn new(config: Mailrelay) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &Mailrelay {
        &self.config
    }

    /// # Errors
    /// If the ledger store cannot be initialised
    pub fn ledger(&self) -> anyhow::Result<Ledger> {
        Ok(self.config.ledger.clone().into_ledger(Duration::from_secs(
            self.config.processing_timeout_secs,
        ))?)
    }

    /// Build a forwarder that acknowledges records on `queue`
    ///
    /// # Errors
    /// If any collaborator cannot be built from the configuration
    pub async fn forwarder(&self, queue: Arc<dyn QueueStore>) -> anyhow::Result<Forwarder> {
        internal!("Building forwarder from configuration");

        let resolver = self.config.destinations.clone().into_resolver().await?;
        let transport = self.config.transport.clone().into_transport()?;

        Ok(Forwarder::builder()
            .ledger(self.ledger()?)
            .objects(self.config.objects.clone().into_store())
            .resolver(resolver)
            .rewriter(Rewriter::new(self.config.sender.as_str())?)
            .transport(transport)
            .queue(queue)
            .max_concurrent_records(self.config.max_concurrent_records)
            .build()?)
    }

    /// Process every record of `event`
    ///
    /// # Errors
    /// If the forwarder cannot be built; record failures are reported in
    /// [`Processed::report`] instead.
    pub async fn process(&self, event: QueueEvent) -> anyhow::Result<Processed> {
        let queue = MemoryQueue::new();
        for record in &event.records {
            if let Err(e) = queue.enqueue(record.clone()) {
                warn!(message_id = %record.message_id, error = %e, "Record has an unusable queue identifier");
            }
        }

        let forwarder = Arc::new(self.forwarder(Arc::new(queue)).await?);
        let records = event.records.clone();
        let report = forwarder.handle_event(event).await;

        let unacknowledged = records
            .into_iter()
            .zip(&report.records)
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(record, _)| record)
            .collect();

        Ok(Processed {
            report,
            unacknowledged,
        })
    }

    /// Forward a stored message directly, without the ledger or a queue
    ///
    /// # Errors
    /// If the forwarder cannot be built or forwarding fails
    pub async fn forward(&self, notification: &StorageNotification) -> anyhow::Result<Delivered> {
        let forwarder = self.forwarder(Arc::new(MemoryQueue::new())).await?;
        Ok(forwarder.forward(notification).await?)
    }

    /// # Errors
    /// If `message_id` is invalid or the ledger cannot be read
    pub async fn ledger_entry(&self, message_id: &str) -> anyhow::Result<Option<LedgerEntry>> {
        let id = MessageId::new(message_id)?;
        Ok(self.ledger()?.get(&id).await?)
    }
}
