//! Test support utilities for end-to-end testing
//!
//! The harness lays out a complete file-backed deployment in a temporary
//! directory: ledger, object bucket and outbox.

pub mod harness;

pub use harness::E2ETestHarness;
