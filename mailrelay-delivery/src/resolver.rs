//! Recipient to forwarding-destination mapping

use std::{collections::HashMap, fmt, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{address::Address, error::ResolveError};

/// Partition key of the destination table
///
/// `local#domain` for a specific address and `*#domain` for the domain's
/// catch-all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey(String);

impl LookupKey {
    #[must_use]
    pub fn exact(address: &Address) -> Self {
        Self(format!("{}#{}", address.local(), address.domain()))
    }

    #[must_use]
    pub fn catch_all(domain: &str) -> Self {
        Self(format!("*#{domain}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage behind the resolver. Read-only from the forwarder's point of view.
#[async_trait]
pub trait DestinationStore: Send + Sync + Debug {
    /// Destinations registered under `key`, possibly none
    ///
    /// # Errors
    /// If the store cannot be queried
    async fn lookup(&self, key: &LookupKey) -> Result<Vec<String>, ResolveError>;

    /// Register `destination` under `key`
    ///
    /// # Errors
    /// If the store cannot be written
    async fn add_destination(&self, key: LookupKey, destination: String)
    -> Result<(), ResolveError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDestinationStore {
    mappings: Arc<DashMap<LookupKey, Vec<String>>>,
}

impl MemoryDestinationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DestinationStore for MemoryDestinationStore {
    async fn lookup(&self, key: &LookupKey) -> Result<Vec<String>, ResolveError> {
        Ok(self
            .mappings
            .get(key)
            .map(|destinations| destinations.value().clone())
            .unwrap_or_default())
    }

    async fn add_destination(
        &self,
        key: LookupKey,
        destination: String,
    ) -> Result<(), ResolveError> {
        let mut destinations = self.mappings.entry(key).or_default();
        if !destinations.contains(&destination) {
            destinations.push(destination);
        }
        Ok(())
    }
}

/// Forwards everything to one static recipient
#[derive(Debug, Clone)]
pub struct FixedDestination {
    recipient: String,
}

impl FixedDestination {
    /// # Errors
    /// If `recipient` is not a mail identity
    pub fn new(recipient: impl Into<String>) -> Result<Self, ResolveError> {
        let recipient = recipient.into();
        Address::parse(&recipient)?;
        Ok(Self { recipient })
    }
}

#[async_trait]
impl DestinationStore for FixedDestination {
    async fn lookup(&self, _key: &LookupKey) -> Result<Vec<String>, ResolveError> {
        Ok(vec![self.recipient.clone()])
    }

    async fn add_destination(
        &self,
        _key: LookupKey,
        _destination: String,
    ) -> Result<(), ResolveError> {
        Err(ResolveError::ReadOnly)
    }
}

/// Maps recipients to forwarding destinations, falling back to the domain's
/// catch-all when an address has no mapping of its own.
#[derive(Debug, Clone)]
pub struct Resolver {
    table: Arc<str>,
    store: Arc<dyn DestinationStore>,
}

impl Resolver {
    pub fn new(table: impl Into<Arc<str>>, store: Arc<dyn DestinationStore>) -> Self {
        Self {
            table: table.into(),
            store,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Destinations for a single recipient; empty when neither the address
    /// nor its domain's catch-all is mapped.
    ///
    /// # Errors
    /// If the store fails
    pub async fn resolve(&self, recipient: &Address) -> Result<Vec<String>, ResolveError> {
        let exact = LookupKey::exact(recipient);
        let destinations = self.store.lookup(&exact).await?;
        if !destinations.is_empty() {
            debug!(table = %self.table, key = %exact, count = destinations.len(), "Resolved recipient");
            return Ok(destinations);
        }

        let fallback = LookupKey::catch_all(recipient.domain());
        let destinations = self.store.lookup(&fallback).await?;
        debug!(table = %self.table, key = %fallback, count = destinations.len(), "Resolved recipient via catch-all");
        Ok(destinations)
    }

    /// The deduplicated union of every recipient's destinations, in the order
    /// they were first seen.
    ///
    /// # Errors
    /// [`ResolveError::NoDestination`] if the union is empty, or a store error
    pub async fn resolve_all(&self, recipients: &[Address]) -> Result<Vec<String>, ResolveError> {
        let mut resolved: Vec<String> = Vec::new();

        for recipient in recipients {
            let destinations = self.resolve(recipient).await?;
            if destinations.is_empty() {
                warn!(table = %self.table, recipient = %recipient, "No destination for recipient");
            }

            for destination in destinations {
                if !resolved.contains(&destination) {
                    resolved.push(destination);
                }
            }
        }

        if resolved.is_empty() {
            let names: Vec<String> = recipients.iter().map(ToString::to_string).collect();
            return Err(ResolveError::NoDestination(names.join(", ")));
        }

        Ok(resolved)
    }
}

/// Where forwarding destinations come from
///
/// ```ron
/// destinations: Table(
///     table: "forwarding",
///     mappings: {
///         "b@y.com": ["c@z.com"],
///         "*@y.com": ["d@z.com"],
///     },
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum DestinationConfig {
    Table {
        #[serde(default = "default_table")]
        table: String,
        #[serde(default)]
        mappings: HashMap<String, Vec<String>>,
    },
    Fixed {
        recipient: String,
    },
}

fn default_table() -> String {
    "destinations".to_string()
}

impl DestinationConfig {
    /// Build a resolver, seeding the table from the configured mappings
    ///
    /// # Errors
    /// If a mapping key or the fixed recipient is not a mail identity
    pub async fn into_resolver(self) -> Result<Resolver, ResolveError> {
        match self {
            Self::Table { table, mappings } => {
                let store = MemoryDestinationStore::new();
                for (identity, destinations) in mappings {
                    let key = LookupKey::exact(&Address::parse(&identity)?);
                    for destination in destinations {
                        store.add_destination(key.clone(), destination).await?;
                    }
                }
                Ok(Resolver::new(table, Arc::new(store)))
            }
            Self::Fixed { recipient } => Ok(Resolver::new(
                "fixed",
                Arc::new(FixedDestination::new(recipient)?),
            )),
        }
    }
}
