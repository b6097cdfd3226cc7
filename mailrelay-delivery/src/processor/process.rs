//! Handling of a single queue record

use mailrelay_ledger::{LedgerEntry, LedgerError, Status};
use tracing::{debug, info, warn};

use crate::{
    error::{ProcessingError, QueueError, TransportError},
    processor::{Forwarder, claim::Claim},
    record::{QueueRecord, StorageNotification},
    rewrite::InboundMessage,
    types::{Delivered, Outcome},
};

impl Forwarder {
    /// Process one queue record end to end.
    ///
    /// The record is acknowledged only when this call returns `Ok`.
    ///
    /// # Errors
    /// Any failure of a collaborator; see [`ProcessingError`]
    #[tracing::instrument(level = "debug", skip_all, fields(message_id = %record.message_id))]
    pub async fn handle_record(&self, record: &QueueRecord) -> Result<Outcome, ProcessingError> {
        let message_id = record.message_id()?;
        let notification = record.notification()?;

        let entry = match self.claim(&message_id).await? {
            Claim::Duplicate(entry) => {
                info!(
                    message_id = %message_id,
                    consumption_count = entry.consumption_count,
                    "Message already forwarded, acknowledging duplicate delivery"
                );
                self.acknowledge(record).await?;
                return Ok(Outcome::Duplicate);
            }
            Claim::Owned(entry) => entry,
        };

        let delivered = self.deliver(&notification).await?;

        info!(
            message_id = %message_id,
            provider_message_id = %delivered.provider_message_id,
            destinations = ?delivered.destinations,
            "Message forwarded"
        );

        self.finalize(&entry).await?;
        self.acknowledge(record).await?;

        Ok(Outcome::Forwarded(delivered))
    }

    /// Forward the message stored at `notification` without consulting the
    /// ledger or touching the queue.
    ///
    /// # Errors
    /// If fetching, resolving, rewriting or dispatching fails
    pub async fn forward(
        &self,
        notification: &StorageNotification,
    ) -> Result<Delivered, ProcessingError> {
        self.deliver(notification).await
    }

    async fn deliver(
        &self,
        notification: &StorageNotification,
    ) -> Result<Delivered, ProcessingError> {
        let raw = self
            .objects
            .fetch(&notification.bucket, &notification.key)
            .await?;
        debug!(
            bucket = %notification.bucket,
            key = %notification.key,
            size = raw.len(),
            "Fetched raw message"
        );

        let inbound = InboundMessage::parse(&raw)?;
        let destinations = self.resolver.resolve_all(inbound.recipients()).await?;
        let message = self.rewriter.rewrite(&inbound, &destinations);

        let receipt = self
            .transport
            .send_raw(&message.source, &message.destinations, &message.raw)
            .await?;

        if !receipt.is_success() {
            return Err(TransportError::Status(receipt.status).into());
        }

        Ok(Delivered {
            provider_message_id: receipt.provider_message_id,
            destinations,
        })
    }

    /// Mark the message `COMPLETE`. Losing this race means another attempt
    /// reclaimed the message and sent it as well; there is nothing left to
    /// undo, so the record is still acknowledged.
    async fn finalize(&self, entry: &LedgerEntry) -> Result<(), ProcessingError> {
        match self.ledger.advance(entry, Status::Complete).await {
            Ok(_) => Ok(()),
            Err(LedgerError::Conflict { message_id, .. }) => {
                warn!(
                    message_id = %message_id,
                    "Message was finalized by another attempt after dispatch"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn acknowledge(&self, record: &QueueRecord) -> Result<(), ProcessingError> {
        match self
            .queue
            .delete(&record.event_source_arn, &record.receipt_handle)
            .await
        {
            Ok(()) => {
                debug!(message_id = %record.message_id, "Acknowledged record");
                Ok(())
            }
            Err(QueueError::NotFound { queue, .. }) => {
                warn!(
                    message_id = %record.message_id,
                    queue = %queue,
                    "Record was already deleted from the queue"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
