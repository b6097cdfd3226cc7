//! Forwarding of inbound mail announced on an at-least-once queue
//!
//! This crate provides:
//! - Decoding of queue events and their storage notifications
//! - The collaborators a [`Forwarder`] talks to: object storage, destination
//!   lookup, header rewriting, mail transport and queue acknowledgement
//! - The [`Forwarder`] itself, which uses the idempotency ledger to forward
//!   each queue message at most once per successful attempt

mod address;
mod error;
pub mod object;
mod processor;
pub mod queue;
mod record;
pub mod resolver;
mod rewrite;
pub mod transport;
mod types;

pub use address::Address;
pub use error::{
    ObjectStoreError, ProcessingError, QueueError, RecordError, ResolveError, RewriteError,
    TransportError,
};
pub use object::{FileObjectStore, MemoryObjectStore, ObjectStore, ObjectStoreConfig};
pub use processor::{Forwarder, ForwarderBuilder, claim::Claim, default_max_concurrent_records};
pub use queue::{MemoryQueue, QueueStore};
pub use record::{QueueEvent, QueueRecord, StorageNotification};
pub use resolver::{
    DestinationConfig, DestinationStore, FixedDestination, LookupKey, MemoryDestinationStore,
    Resolver,
};
pub use rewrite::{ForwardedMessage, InboundMessage, Rewriter};
pub use transport::{MailTransport, MemoryTransport, OutboxTransport, SendReceipt, TransportConfig};
pub use types::{BatchReport, Delivered, Outcome, RecordReport};
