use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Processing state of a queue message.
///
/// `Complete` is terminal: no write ever moves an entry out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETE")]
    Complete,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETE" => Ok(Self::Complete),
            other => Err(LedgerError::Internal(format!("Unknown status: {other}"))),
        }
    }
}

/// Field names of a stored ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    MessageId,
    Status,
    ConsumptionCount,
    Updated,
}

impl Field {
    pub const ALL: [Self; 4] = [
        Self::MessageId,
        Self::Status,
        Self::ConsumptionCount,
        Self::Updated,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MessageId => "message_id",
            Self::Status => "status",
            Self::ConsumptionCount => "consumption_count",
            Self::Updated => "updated",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Identifier of a queue message, the ledger's key.
///
/// Queue identifiers are opaque, but they end up as file names in the file
/// backend, so anything that could escape a directory is rejected up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Validate and wrap a queue message identifier
    ///
    /// # Errors
    /// Returns [`LedgerError::InvalidMessageId`] if the identifier is empty,
    /// contains path separators or `..`, starts with a `.`, or contains
    /// control characters.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();

        if id.is_empty()
            || id.starts_with('.')
            || id.contains(['/', '\\'])
            || id.contains("..")
            || id.chars().any(char::is_control)
        {
            return Err(LedgerError::InvalidMessageId(id));
        }

        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MessageId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageId> for String {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

impl FromStr for MessageId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// One ledger record per queue message identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "message_id")]
    pub message_id: MessageId,
    #[serde(rename = "status")]
    pub status: Status,
    /// How many times this message has been written, i.e. observed or finished
    #[serde(rename = "consumption_count")]
    pub consumption_count: u64,
    /// Unix timestamp (seconds) of the last accepted write
    #[serde(rename = "updated")]
    pub updated_at: u64,
}

impl LedgerEntry {
    /// A freshly claimed entry, as written on first sight of a message
    #[must_use]
    pub const fn first_sighting(message_id: MessageId, now: u64) -> Self {
        Self {
            message_id,
            status: Status::InProgress,
            consumption_count: 1,
            updated_at: now,
        }
    }

    /// The entry that results from advancing this one to `status` at `now`
    #[must_use]
    pub fn advanced(&self, status: Status, now: u64) -> Self {
        Self {
            message_id: self.message_id.clone(),
            status,
            consumption_count: self.consumption_count.saturating_add(1),
            updated_at: now,
        }
    }

    /// Every stored field with its value, in [`Field::ALL`] order
    #[must_use]
    pub fn fields(&self) -> [(Field, String); 4] {
        Field::ALL.map(|field| {
            let value = match field {
                Field::MessageId => self.message_id.to_string(),
                Field::Status => self.status.to_string(),
                Field::ConsumptionCount => self.consumption_count.to_string(),
                Field::Updated => self.updated_at.to_string(),
            };
            (field, value)
        })
    }

    /// Seconds elapsed since the last accepted write, as seen at `now`
    #[must_use]
    pub const fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.updated_at)
    }
}
