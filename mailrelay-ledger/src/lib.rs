//! Idempotency ledger for queue records.
//!
//! One [`LedgerEntry`] is kept per queue message identifier. All mutation goes
//! through conditional single-entry writes, so at most one worker holds a
//! message `IN_PROGRESS` at any time without any lock service.

pub mod backends;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod r#trait;

pub use backends::{FileLedgerStore, MemoryLedgerStore, TestLedgerStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LedgerConfig, StoreConfig};
pub use entry::{Field, LedgerEntry, MessageId, Status};
pub use error::{LedgerError, Result};
pub use ledger::Ledger;
pub use r#trait::{Condition, LedgerStore};
