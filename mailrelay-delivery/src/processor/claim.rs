//! Ledger claims: deciding whether this attempt owns a message

use mailrelay_ledger::{LedgerEntry, LedgerError, MessageId, Status};
use tracing::{debug, info, warn};

use crate::{error::ProcessingError, processor::Forwarder};

/// What the ledger says about a message this attempt is about to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// This attempt owns the message; the entry is as written by the claim
    Owned(LedgerEntry),
    /// The message was forwarded already
    Duplicate(LedgerEntry),
}

impl Forwarder {
    /// Claim `message_id` for this attempt.
    ///
    /// - No entry: create one. Losing the creation race re-reads the entry
    ///   once and follows whatever the winner wrote.
    /// - `COMPLETE`: a duplicate delivery.
    /// - `IN_PROGRESS`: reclaim it, which only succeeds once the owner has
    ///   been silent for the processing timeout.
    ///
    /// # Errors
    /// [`ProcessingError::InFlight`] if another attempt holds a fresh claim,
    /// or a ledger error.
    pub async fn claim(&self, message_id: &MessageId) -> Result<Claim, ProcessingError> {
        let mut lost_create_race = false;

        loop {
            match self.ledger.get(message_id).await? {
                Some(entry) if entry.status.is_terminal() => return Ok(Claim::Duplicate(entry)),
                Some(entry) => return self.reclaim(&entry).await,
                None => match self.ledger.create(message_id).await {
                    Ok(entry) => {
                        debug!(message_id = %message_id, "Claimed new message");
                        return Ok(Claim::Owned(entry));
                    }
                    Err(LedgerError::AlreadyExists(_)) if !lost_create_race => {
                        debug!(message_id = %message_id, "Lost creation race, re-reading entry");
                        lost_create_race = true;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }
    }

    async fn reclaim(&self, entry: &LedgerEntry) -> Result<Claim, ProcessingError> {
        let age_secs = entry.age(self.ledger.now());

        match self.ledger.advance(entry, Status::InProgress).await {
            Ok(reclaimed) => {
                info!(
                    message_id = %reclaimed.message_id,
                    age_secs,
                    consumption_count = reclaimed.consumption_count,
                    "Reclaimed stale message"
                );
                Ok(Claim::Owned(reclaimed))
            }
            Err(LedgerError::Conflict { message_id, .. }) => {
                warn!(
                    message_id = %message_id,
                    age_secs,
                    "Message is in flight elsewhere, leaving it for redelivery"
                );
                Err(ProcessingError::InFlight { message_id })
            }
            Err(e) => Err(e.into()),
        }
    }
}
