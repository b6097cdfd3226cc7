//! Backend storage implementations for the ledger
//!
//! - `memory`: `DashMap`-backed, for tests and single-process deployments
//! - `test`: memory store with write counting and failure injection
//! - `file`: one JSON document per message in a directory

pub mod file;
pub mod memory;
pub mod test;

pub use file::FileLedgerStore;
pub use memory::MemoryLedgerStore;
pub use test::TestLedgerStore;
