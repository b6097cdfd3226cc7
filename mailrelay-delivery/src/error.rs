//! Typed errors for record processing.
//!
//! Each collaborator of the [`Forwarder`](crate::Forwarder) has its own error
//! type; [`ProcessingError`] wraps them so that a failed record can be
//! reported with the stage it failed at. Every [`ProcessingError`] leaves the
//! queue record unacknowledged, so the queue redelivers it.

use mailrelay_ledger::{LedgerError, MessageId};
use thiserror::Error;

/// Failure to decode a queue record or the notification it carries
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record body is not a notification envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("Notification does not describe a stored object: {0}")]
    Notification(#[source] serde_json::Error),

    #[error("Invalid queue message id: {0}")]
    InvalidMessageId(String),

    #[error("Invalid queue event: {0}")]
    Event(#[from] serde_json::Error),
}

/// Failure to fetch a raw message from object storage
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("Access denied to object {bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    #[error("Invalid object location: {0}")]
    InvalidKey(String),

    #[error("Object store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to acknowledge (delete) a record on the queue
#[derive(Debug, Error)]
pub enum QueueError {
    /// The receipt handle is unknown, usually because it was deleted already
    #[error("No message with receipt handle {receipt_handle} on queue {queue}")]
    NotFound {
        queue: String,
        receipt_handle: String,
    },

    #[error("Invalid queue identifier: {0}")]
    InvalidArn(String),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

/// Failure to map a recipient to its forwarding destinations
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid mail identity: {0}")]
    InvalidIdentity(String),

    #[error("No forwarding destination for {0}")]
    NoDestination(String),

    #[error("Destination store is read-only")]
    ReadOnly,

    #[error("Destination store error: {0}")]
    Store(String),
}

/// Failure to parse or rewrite the raw message
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Unable to parse message headers: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("Message has no {0} header")]
    MissingHeader(&'static str),

    #[error("Unusable recipient list: {0}")]
    InvalidRecipients(String),

    #[error("Invalid sender identity: {0}")]
    InvalidSender(String),
}

/// Failure reported by the outbound mail transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("Transport answered with status {0}")]
    Status(u16),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to process one queue record.
///
/// None of these acknowledge the record: the queue will redeliver it and the
/// ledger decides what the next attempt does.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Another worker holds a fresh claim on this message
    #[error("Message {message_id} is being processed by another worker")]
    InFlight { message_id: MessageId },

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] ObjectStoreError),

    #[error("Resolve failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Rewrite failed: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Dispatch failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Acknowledge failed: {0}")]
    Acknowledge(#[from] QueueError),

    #[error("Forwarder not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProcessingError {
    /// Returns `true` if another worker currently owns the message
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }

    /// Returns `true` if the record lost a race for the message to another
    /// worker, either to a fresh claim or in the ledger itself
    #[must_use]
    pub const fn is_contended(&self) -> bool {
        match self {
            Self::InFlight { .. } => true,
            Self::Ledger(e) => e.is_race(),
            _ => false,
        }
    }

    /// Returns `true` if redelivering the same record cannot succeed without
    /// an operator changing data or configuration first.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Record(_)
                | Self::Rewrite(_)
                | Self::NotConfigured(_)
                | Self::Fetch(ObjectStoreError::NotFound { .. } | ObjectStoreError::InvalidKey(_))
                | Self::Resolve(
                    ResolveError::NoDestination(_) | ResolveError::InvalidIdentity(_)
                )
        )
    }
}
