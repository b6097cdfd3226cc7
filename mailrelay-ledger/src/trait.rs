use async_trait::async_trait;

use crate::{LedgerEntry, MessageId, Status};

/// Guard evaluated atomically against the stored entry before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// No entry exists for the key.
    NotExists,
    /// The stored entry has this status and has not been written since it
    /// had `consumption_count`.
    Unchanged {
        status: Status,
        consumption_count: u64,
    },
    /// As [`Condition::Unchanged`], and the entry was last written at or
    /// before `cutoff` (Unix seconds).
    UnchangedAndUpdatedAtOrBefore {
        status: Status,
        consumption_count: u64,
        cutoff: u64,
    },
}

impl Condition {
    /// Evaluate the guard against the currently stored entry, if any
    #[must_use]
    pub fn holds(self, current: Option<&LedgerEntry>) -> bool {
        match (self, current) {
            (Self::NotExists, None) => true,
            (Self::NotExists, Some(_)) | (_, None) => false,
            (
                Self::Unchanged {
                    status,
                    consumption_count,
                },
                Some(entry),
            ) => entry.status == status && entry.consumption_count == consumption_count,
            (
                Self::UnchangedAndUpdatedAtOrBefore {
                    status,
                    consumption_count,
                    cutoff,
                },
                Some(entry),
            ) => {
                entry.status == status
                    && entry.consumption_count == consumption_count
                    && entry.updated_at <= cutoff
            }
        }
    }
}

/// Strongly consistent key-value storage for ledger entries.
///
/// Implementations must make [`LedgerStore::put`] atomic with respect to its
/// condition: evaluating the guard and writing the entry happen as one step,
/// and a read issued after a successful `put` returns the written entry.
#[async_trait]
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    /// Read the entry for `id` without any stale-read window
    async fn get(&self, id: &MessageId) -> crate::Result<Option<LedgerEntry>>;

    /// Replace the entry keyed by `entry.message_id` if `condition` holds
    ///
    /// # Errors
    /// Returns [`LedgerError::ConditionFailed`](crate::LedgerError::ConditionFailed)
    /// when the guard does not hold; other errors indicate storage failure.
    async fn put(&self, entry: &LedgerEntry, condition: Condition) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn entry(status: Status, updated_at: u64) -> LedgerEntry {
        LedgerEntry {
            message_id: MessageId::new("m1").unwrap(),
            status,
            consumption_count: 1,
            updated_at,
        }
    }

    #[test]
    fn test_not_exists() {
        assert!(Condition::NotExists.holds(None));
        assert!(!Condition::NotExists.holds(Some(&entry(Status::InProgress, 0))));
    }

    #[test]
    fn test_status_guards_fail_on_missing_entry() {
        assert!(
            !Condition::Unchanged {
                status: Status::InProgress,
                consumption_count: 1,
            }
            .holds(None)
        );
        assert!(
            !Condition::UnchangedAndUpdatedAtOrBefore {
                status: Status::InProgress,
                consumption_count: 1,
                cutoff: u64::MAX,
            }
            .holds(None)
        );
    }

    #[test]
    fn test_unchanged_requires_matching_count() {
        let guard = Condition::Unchanged {
            status: Status::InProgress,
            consumption_count: 1,
        };
        let mut rewritten = entry(Status::InProgress, 0);
        rewritten.consumption_count = 2;

        assert!(guard.holds(Some(&entry(Status::InProgress, 0))));
        assert!(!guard.holds(Some(&rewritten)));
        assert!(!guard.holds(Some(&entry(Status::Complete, 0))));
    }

    #[test]
    fn test_staleness_cutoff_is_inclusive() {
        let guard = Condition::UnchangedAndUpdatedAtOrBefore {
            status: Status::InProgress,
            consumption_count: 1,
            cutoff: 100,
        };

        assert!(guard.holds(Some(&entry(Status::InProgress, 99))));
        assert!(guard.holds(Some(&entry(Status::InProgress, 100))));
        assert!(!guard.holds(Some(&entry(Status::InProgress, 101))));
        assert!(!guard.holds(Some(&entry(Status::Complete, 0))));
    }
}
