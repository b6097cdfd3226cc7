use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::memory::MemoryLedgerStore;
use crate::{
    LedgerEntry, LedgerError, MessageId,
    r#trait::{Condition, LedgerStore},
};

/// Testing utilities for the memory-backed ledger
///
/// Counts accepted writes, lets a test wait for them, and can fail the next
/// write to simulate a storage outage.
#[derive(Debug, Clone, Default)]
pub struct TestLedgerStore {
    pub(crate) inner: MemoryLedgerStore,
    writes: Arc<AtomicUsize>,
    fail_next: Arc<Mutex<Option<String>>>,
    notify: Arc<Notify>,
}

impl TestLedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes the store has accepted
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `put` fail with an internal error carrying `reason`
    pub fn fail_next_put(&self, reason: impl Into<String>) {
        *self
            .fail_next
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(reason.into());
    }

    /// Wait until at least `expected` writes have been accepted
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first
    pub async fn wait_for_writes(&self, expected: usize, timeout: Duration) -> crate::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.write_count() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|e| LedgerError::Internal(format!("Timeout waiting for ledger writes: {e}")))
    }

    /// All stored entries, for assertions
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl LedgerStore for TestLedgerStore {
    async fn get(&self, id: &MessageId) -> crate::Result<Option<LedgerEntry>> {
        self.inner.get(id).await
    }

    async fn put(&self, entry: &LedgerEntry, condition: Condition) -> crate::Result<()> {
        let injected = self.fail_next.lock()?.take();
        if let Some(reason) = injected {
            return Err(LedgerError::Internal(reason));
        }

        self.inner.put(entry, condition).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = TestLedgerStore::new();
        let entry = LedgerEntry::first_sighting(MessageId::new("m1").unwrap(), 1);

        store.fail_next_put("ledger offline");
        let err = store.put(&entry, Condition::NotExists).await.unwrap_err();
        assert!(err.to_string().contains("ledger offline"));
        assert_eq!(store.write_count(), 0);

        store.put(&entry, Condition::NotExists).await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.entries(), vec![entry]);
    }

    #[tokio::test]
    async fn test_wait_for_writes_times_out() {
        let store = TestLedgerStore::new();
        let result = store.wait_for_writes(1, Duration::from_millis(20)).await;
        assert!(result.is_err());
    }
}
