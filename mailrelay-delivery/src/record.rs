//! Queue event and record decoding.
//!
//! A queue event carries a batch of records. Each record body is a
//! notification envelope whose `Message` field is itself a JSON document
//! naming the bucket and key the receiving service stored the raw mail at.

use mailrelay_ledger::MessageId;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// A batch of queue records, as delivered to one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

impl QueueEvent {
    /// Decode a queue event from JSON
    ///
    /// # Errors
    /// If the document is not a queue event
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RecordError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode as JSON, e.g. to re-submit records that were not acknowledged
    ///
    /// # Errors
    /// If serialization fails
    pub fn to_vec(&self) -> Result<Vec<u8>, RecordError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// One message from the at-least-once queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Queue-assigned identifier, the ledger key
    #[serde(rename = "messageId")]
    pub message_id: String,

    /// Token used to delete this delivery of the record
    #[serde(rename = "receiptHandle")]
    pub receipt_handle: String,

    /// Identifier of the originating queue
    #[serde(rename = "eventSourceARN")]
    pub event_source_arn: String,

    pub body: String,
}

impl QueueRecord {
    /// The validated ledger key for this record
    ///
    /// # Errors
    /// If the queue identifier is not usable as a ledger key
    pub fn message_id(&self) -> Result<MessageId, RecordError> {
        MessageId::new(self.message_id.as_str())
            .map_err(|_| RecordError::InvalidMessageId(self.message_id.clone()))
    }

    /// Decode the two JSON layers of the body into a storage notification
    ///
    /// # Errors
    /// If either layer is malformed or lacks the bucket or key
    pub fn notification(&self) -> Result<StorageNotification, RecordError> {
        let envelope: Envelope =
            serde_json::from_str(&self.body).map_err(RecordError::Envelope)?;
        let inner: Inner =
            serde_json::from_str(&envelope.message).map_err(RecordError::Notification)?;

        Ok(StorageNotification {
            bucket: inner.receipt.action.bucket_name,
            key: inner.receipt.action.object_key,
        })
    }
}

/// Where the receiving service stored the raw message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNotification {
    pub bucket: String,
    pub key: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct Inner {
    receipt: Receipt,
}

#[derive(Deserialize)]
struct Receipt {
    action: Action,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Action {
    bucket_name: String,
    object_key: String,
}
