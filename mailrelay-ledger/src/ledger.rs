use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    Clock, LedgerEntry, LedgerError, MessageId, Status, SystemClock,
    r#trait::{Condition, LedgerStore},
};

/// Per-message processing state with race-safe transitions.
///
/// Every transition is one conditional write against the backing store:
/// - [`Ledger::create`] only succeeds when no entry exists yet.
/// - [`Ledger::advance`] to `IN_PROGRESS` (a reclaim) only succeeds when the
///   stored entry is still `IN_PROGRESS` and has not been written for at least
///   the processing timeout.
/// - [`Ledger::advance`] to `COMPLETE` only succeeds when the stored entry is
///   still `IN_PROGRESS`, so nothing is ever completed twice or resurrected.
///
/// Both advances also require the stored entry to be the one the caller
/// read: an attempt holding a snapshot that another worker has since
/// rewritten loses with a conflict, so every accepted write raises the
/// stored count by exactly one.
#[derive(Debug, Clone)]
pub struct Ledger {
    table: Arc<str>,
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    processing_timeout: Duration,
}

impl Ledger {
    pub fn new(
        table: impl Into<Arc<str>>,
        store: Arc<dyn LedgerStore>,
        processing_timeout: Duration,
    ) -> Self {
        Self {
            table: table.into(),
            store,
            clock: Arc::new(SystemClock),
            processing_timeout,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub const fn processing_timeout(&self) -> Duration {
        self.processing_timeout
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Strongly consistent read of the entry for `id`
    ///
    /// # Errors
    /// If the backing store cannot be read
    pub async fn get(&self, id: &MessageId) -> crate::Result<Option<LedgerEntry>> {
        debug!(table = %self.table, message_id = %id, "Querying ledger");
        self.store.get(id).await
    }

    /// Record the first sighting of `id` as `IN_PROGRESS` with a count of 1
    ///
    /// # Errors
    /// [`LedgerError::AlreadyExists`] if any entry for `id` exists already;
    /// the caller should re-read it with [`Ledger::get`].
    pub async fn create(&self, id: &MessageId) -> crate::Result<LedgerEntry> {
        let entry = LedgerEntry::first_sighting(id.clone(), self.now());

        info!(table = %self.table, message_id = %id, "Creating ledger entry");

        match self.store.put(&entry, Condition::NotExists).await {
            Ok(()) => Ok(entry),
            Err(LedgerError::ConditionFailed(id)) => Err(LedgerError::AlreadyExists(id)),
            Err(e) => Err(e),
        }
    }

    /// Move `entry` to `target`, bumping its consumption count and timestamp
    ///
    /// Returns the entry as written.
    ///
    /// # Errors
    /// [`LedgerError::Conflict`] if the stored entry does not satisfy the
    /// guard for `target` (see the type-level docs).
    pub async fn advance(&self, entry: &LedgerEntry, target: Status) -> crate::Result<LedgerEntry> {
        let now = self.now();
        let condition = self.guard_for(entry, target, now);
        let next = entry.advanced(target, now);

        info!(
            table = %self.table,
            message_id = %entry.message_id,
            status = %target,
            consumption_count = next.consumption_count,
            "Advancing ledger entry"
        );

        match self.store.put(&next, condition).await {
            Ok(()) => Ok(next),
            Err(LedgerError::ConditionFailed(message_id)) => {
                warn!(
                    table = %self.table,
                    message_id = %message_id,
                    status = %target,
                    "Ledger guard rejected transition"
                );
                Err(LedgerError::Conflict { message_id, target })
            }
            Err(e) => Err(e),
        }
    }

    fn guard_for(&self, entry: &LedgerEntry, target: Status, now: u64) -> Condition {
        match target {
            Status::InProgress => Condition::UnchangedAndUpdatedAtOrBefore {
                status: Status::InProgress,
                consumption_count: entry.consumption_count,
                cutoff: now.saturating_sub(self.processing_timeout.as_secs()),
            },
            Status::Complete => Condition::Unchanged {
                status: Status::InProgress,
                consumption_count: entry.consumption_count,
            },
        }
    }
}
