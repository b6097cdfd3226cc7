use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    LedgerEntry, LedgerError, MessageId,
    r#trait::{Condition, LedgerStore},
};

/// In-memory ledger store
///
/// Entries live in a `DashMap`. A conditional write holds the shard lock for
/// its key while the guard is checked and the entry replaced, which makes
/// every `put` atomic per message id. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    pub(crate) entries: Arc<DashMap<MessageId, LedgerEntry>>,
}

impl MemoryLedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get(&self, id: &MessageId) -> crate::Result<Option<LedgerEntry>> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, entry: &LedgerEntry, condition: Condition) -> crate::Result<()> {
        match self.entries.entry(entry.message_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if !condition.holds(Some(occupied.get())) {
                    return Err(LedgerError::ConditionFailed(entry.message_id.clone()));
                }
                occupied.insert(entry.clone());
            }
            Entry::Vacant(vacant) => {
                if !condition.holds(None) {
                    return Err(LedgerError::ConditionFailed(entry.message_id.clone()));
                }
                vacant.insert(entry.clone());
            }
        }

        Ok(())
    }
}
