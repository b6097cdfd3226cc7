//! Outcomes of record processing

use std::fmt;

use crate::error::ProcessingError;

/// A message that was handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub provider_message_id: String,
    pub destinations: Vec<String>,
}

/// How a record that was acknowledged got there
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Forwarded by this attempt
    Forwarded(Delivered),
    /// Already forwarded by an earlier attempt; only acknowledged
    Duplicate,
}

/// Result of handling one record of a batch
#[derive(Debug)]
pub struct RecordReport {
    /// The queue message id as received, even if it failed validation
    pub message_id: String,
    pub result: Result<Outcome, ProcessingError>,
}

impl RecordReport {
    pub const fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

/// Per-record results of a batch, in the order the records arrived
#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<RecordReport>,
}

impl BatchReport {
    pub fn forwarded(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.result, Ok(Outcome::Forwarded(_))))
            .count()
    }

    pub fn duplicates(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.result, Ok(Outcome::Duplicate)))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ProcessingError)> {
        self.records.iter().filter_map(|r| match &r.result {
            Ok(_) => None,
            Err(e) => Some((r.message_id.as_str(), e)),
        })
    }

    /// `true` when every record was acknowledged
    pub fn is_success(&self) -> bool {
        self.records.iter().all(|r| r.result.is_ok())
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} forwarded, {} duplicate, {} failed",
            self.records.len(),
            self.forwarded(),
            self.duplicates(),
            self.failures().count()
        )
    }
}
