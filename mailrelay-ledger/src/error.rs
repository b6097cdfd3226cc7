//! Error types for the mailrelay-ledger crate.
//!
//! Conditional-write failures are reported by stores as
//! [`LedgerError::ConditionFailed`]; the [`Ledger`](crate::Ledger) facade
//! turns them into the caller-meaningful [`LedgerError::AlreadyExists`] (on
//! create) or [`LedgerError::Conflict`] (on advance).

use std::io;

use thiserror::Error;

use crate::{MessageId, Status};

/// Top-level ledger error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A conditional write's guard did not hold against the stored entry.
    #[error("Conditional check failed for {0}")]
    ConditionFailed(MessageId),

    /// An entry already exists for this message (create lost the race).
    #[error("Ledger entry already exists: {0}")]
    AlreadyExists(MessageId),

    /// An advance was rejected because the stored entry did not satisfy the
    /// transition's guard.
    #[error("Ledger conflict advancing {message_id} to {target}")]
    Conflict { message_id: MessageId, target: Status },

    /// The queue message identifier cannot be used as a ledger key.
    #[error("Invalid message id: {0:?}")]
    InvalidMessageId(String),

    /// I/O operation failed (file backend).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored entry could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Ledger storage path validation failed.
    #[error("Invalid ledger configuration: {0}")]
    Configuration(String),

    /// Internal error (lock poisoning, injected failures, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns `true` if this is the outcome of a lost conditional-write race
    #[must_use]
    pub const fn is_race(&self) -> bool {
        matches!(
            self,
            Self::ConditionFailed(_) | Self::AlreadyExists(_) | Self::Conflict { .. }
        )
    }
}

/// Specialized `Result` type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
