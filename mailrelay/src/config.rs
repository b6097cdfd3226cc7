//! Configuration file discovery and loading

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use mailrelay_delivery::{DestinationConfig, ObjectStoreConfig, TransportConfig};
use mailrelay_ledger::LedgerConfig;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "MAILRELAY_CONFIG";

const fn default_processing_timeout() -> u64 {
    60
}

/// Top-level configuration
///
/// ```ron
/// Mailrelay(
///     sender: "forwarder@relay.example",
///     processing_timeout_secs: 60,
///     ledger: (table: "dedupe", store: File(path: "/var/lib/mailrelay/ledger")),
///     destinations: Table(mappings: { "*@y.com": ["d@z.com"] }),
///     objects: File(root: "/srv/mail"),
///     transport: Outbox(path: "/var/spool/mailrelay/outbox"),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Mailrelay {
    /// Identity forwarded messages are sent from
    pub sender: String,

    /// How long a claim may go without a write before another attempt may
    /// take the message over. Keep this at or below the queue's redelivery
    /// window.
    ///
    /// Default: 60 seconds
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,

    /// Records of one event handled concurrently
    #[serde(default = "mailrelay_delivery::default_max_concurrent_records")]
    pub max_concurrent_records: usize,

    #[serde(default)]
    pub ledger: LedgerConfig,

    pub destinations: DestinationConfig,

    pub objects: ObjectStoreConfig,

    pub transport: TransportConfig,
}

impl Mailrelay {
    /// Parse a configuration document
    ///
    /// # Errors
    /// If the document is not valid RON for this structure
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Read and parse the configuration at `path`
    ///
    /// # Errors
    /// If the file cannot be read or parsed
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        Self::from_ron(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
    }
}

/// Find the configuration file using the following precedence:
/// 1. `MAILRELAY_CONFIG` environment variable
/// 2. ./mailrelay.config.ron (current working directory)
/// 3. /etc/mailrelay/mailrelay.config.ron (system-wide config)
///
/// # Errors
/// If the environment variable names a missing file, or no default exists
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    let default_paths = [
        PathBuf::from("./mailrelay.config.ron"),
        PathBuf::from("/etc/mailrelay/mailrelay.config.ron"),
    ];

    find_config_file_from(std::env::var_os(CONFIG_ENV), &default_paths)
}

fn find_config_file_from(
    env_path: Option<OsString>,
    default_paths: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
