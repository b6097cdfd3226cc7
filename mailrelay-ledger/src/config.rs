use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    Ledger,
    backends::{FileLedgerStore, MemoryLedgerStore},
    r#trait::LedgerStore,
};

fn default_table() -> String {
    "dedupe".to_string()
}

/// Configuration for the ledger
///
/// # Examples
///
/// File-backed ledger in RON config:
/// ```ron
/// ledger: (
///     table: "dedupe",
///     store: File(path: "/var/lib/mailrelay/ledger"),
/// )
/// ```
///
/// Memory-backed ledger (state is lost on exit):
/// ```ron
/// ledger: (store: Memory)
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Name of the ledger table, used to label log output
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            store: StoreConfig::default(),
        }
    }
}

/// Runtime selection of the ledger backing store
#[derive(Debug, Clone, Default, Deserialize)]
pub enum StoreConfig {
    /// Entries kept in process memory
    #[default]
    Memory,
    /// One JSON document per entry in a directory
    File(FileLedgerStore),
}

impl StoreConfig {
    /// Convert the configuration into an initialised backing store
    ///
    /// # Errors
    /// If the file store's directory cannot be prepared
    pub fn into_store(self) -> crate::Result<Arc<dyn LedgerStore>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryLedgerStore::new())),
            Self::File(store) => {
                store.init()?;
                Ok(Arc::new(store))
            }
        }
    }
}

impl LedgerConfig {
    /// Build the ledger described by this configuration
    ///
    /// # Errors
    /// If the backing store cannot be initialised
    pub fn into_ledger(self, processing_timeout: Duration) -> crate::Result<Ledger> {
        let store = self.store.into_store()?;
        Ok(Ledger::new(self.table, store, processing_timeout))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_defaults_to_memory() {
        let config: LedgerConfig = ron::from_str("()").unwrap();
        assert_eq!(config.table, "dedupe");
        assert!(matches!(config.store, StoreConfig::Memory));
    }

    #[test]
    fn test_file_store_config() {
        let config: LedgerConfig =
            ron::from_str("(table: \"seen\", store: File(path: \"/var/lib/mailrelay/ledger\"))")
                .unwrap();
        assert_eq!(config.table, "seen");

        let StoreConfig::File(store) = config.store else {
            panic!("expected a file store");
        };
        assert_eq!(
            store.path(),
            std::path::Path::new("/var/lib/mailrelay/ledger")
        );
    }

    #[tokio::test]
    async fn test_into_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            table: "dedupe".to_string(),
            store: StoreConfig::File(FileLedgerStore::new(dir.path().join("ledger")).unwrap()),
        };

        let ledger = config.into_ledger(Duration::from_secs(30)).unwrap();
        assert_eq!(ledger.table(), "dedupe");
        assert_eq!(ledger.processing_timeout(), Duration::from_secs(30));
        assert!(dir.path().join("ledger").is_dir());
    }
}
