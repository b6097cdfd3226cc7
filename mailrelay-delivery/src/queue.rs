//! Acknowledgement side of the at-least-once queue

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{error::QueueError, record::QueueRecord};

/// Deletes processed records so the queue stops redelivering them
#[async_trait]
pub trait QueueStore: Send + Sync + Debug {
    /// Delete the delivery identified by `receipt_handle` from the queue
    /// named by `queue_arn`
    ///
    /// # Errors
    /// [`QueueError::NotFound`] if the handle is unknown, e.g. because it was
    /// already deleted, or a backend error.
    async fn delete(&self, queue_arn: &str, receipt_handle: &str) -> Result<(), QueueError>;
}

/// The queue name is the last `:` separated component of its identifier
///
/// # Errors
/// If the identifier has no non-empty final component
pub fn queue_name(queue_arn: &str) -> Result<&str, QueueError> {
    queue_arn
        .rsplit(':')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| QueueError::InvalidArn(queue_arn.to_string()))
}

/// An in-memory queue holding records that have not been acknowledged yet
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    pending: Arc<DashMap<(String, String), QueueRecord>>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `record` as delivered but not yet acknowledged
    ///
    /// # Errors
    /// If the record's queue identifier is malformed
    pub fn enqueue(&self, record: QueueRecord) -> Result<(), QueueError> {
        let queue = queue_name(&record.event_source_arn)?.to_string();
        self.pending
            .insert((queue, record.receipt_handle.clone()), record);
        Ok(())
    }

    /// Records that have not been acknowledged, in no particular order
    #[must_use]
    pub fn pending(&self) -> Vec<QueueRecord> {
        self.pending
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn contains(&self, receipt_handle: &str) -> bool {
        self.pending
            .iter()
            .any(|entry| entry.key().1 == receipt_handle)
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn delete(&self, queue_arn: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let queue = queue_name(queue_arn)?.to_string();

        self.pending
            .remove(&(queue.clone(), receipt_handle.to_string()))
            .map(|_| ())
            .ok_or_else(|| QueueError::NotFound {
                queue,
                receipt_handle: receipt_handle.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::record::tests::record;

    #[test]
    fn test_queue_name() {
        assert_eq!(
            queue_name("arn:aws:sqs:eu-west-1:123456789012:inbound").unwrap(),
            "inbound"
        );
        assert_eq!(queue_name("local").unwrap(), "local");
        assert!(matches!(
            queue_name("arn:aws:sqs:"),
            Err(QueueError::InvalidArn(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_acknowledges_once() {
        let queue = MemoryQueue::new();
        let rec = record("m1", "b", "k");
        queue.enqueue(rec.clone()).unwrap();
        assert!(queue.contains("rh-m1"));

        queue
            .delete(&rec.event_source_arn, &rec.receipt_handle)
            .await
            .unwrap();
        assert!(queue.is_empty());

        let again = queue
            .delete(&rec.event_source_arn, &rec.receipt_handle)
            .await;
        assert!(matches!(again, Err(QueueError::NotFound { ref queue, .. }) if queue == "inbound"));
    }

    #[tokio::test]
    async fn test_same_handle_on_other_queue_is_distinct() {
        let queue = MemoryQueue::new();
        queue.enqueue(record("m1", "b", "k")).unwrap();

        let other = queue
            .delete("arn:aws:sqs:eu-west-1:123456789012:other", "rh-m1")
            .await;
        assert!(matches!(other, Err(QueueError::NotFound { .. })));
        assert_eq!(queue.len(), 1);
    }
}
