use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use mailrelay_common::internal;
use serde::Deserialize;
use tokio::{fs, sync::Mutex};

use crate::{
    LedgerEntry, LedgerError, MessageId,
    r#trait::{Condition, LedgerStore},
};

const ENTRY_EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// File-based ledger store
///
/// Each entry is stored as `{message_id}.json` in a single directory.
///
/// # Atomicity
/// Writes go to a temporary file which is then renamed over the entry, so a
/// crash never leaves a half-written entry behind. Conditional writes are
/// serialized through an async mutex shared by all clones of the store: the
/// guard check and the rename happen while it is held. This gives strongly
/// consistent conditional writes for every worker in one process; several
/// processes must not share a directory.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl<'de> Deserialize<'de> for FileLedgerStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileLedgerStoreHelper {
            path: PathBuf,
        }

        let helper = FileLedgerStoreHelper::deserialize(deserializer)?;
        Self::new(helper.path).map_err(serde::de::Error::custom)
    }
}

impl FileLedgerStore {
    /// Create a store rooted at `path`
    ///
    /// # Errors
    /// Returns [`LedgerError::Configuration`] if the path is relative,
    /// contains `..`, or points into a system directory.
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the ledger directory if needed and remove temporary files left
    /// behind by a crash mid-write.
    ///
    /// # Errors
    /// If the directory cannot be created or read, or the path exists but is
    /// not a directory.
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising file ledger at {}", self.path.display());

        if !self.path.try_exists()? {
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(LedgerError::Configuration(format!(
                "Expected {} to be a directory",
                self.path.display()
            )));
        }

        let mut cleaned = 0;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().ends_with(TEMP_SUFFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned temporary files from ledger"
            );
        }

        Ok(())
    }

    fn entry_path(&self, id: &MessageId) -> PathBuf {
        self.path.join(format!("{id}.{ENTRY_EXTENSION}"))
    }

    async fn read_entry(&self, id: &MessageId) -> crate::Result<Option<LedgerEntry>> {
        match fs::read(self.entry_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_path(path: &Path) -> crate::Result<()> {
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(LedgerError::Configuration(format!(
            "Ledger path cannot contain '..' components: {}",
            path.display()
        )));
    }

    if !path.is_absolute() {
        return Err(LedgerError::Configuration(format!(
            "Ledger path must be absolute: {}",
            path.display()
        )));
    }

    let sensitive_prefixes = [
        "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
    ];

    if let Some(prefix) = sensitive_prefixes.iter().find(|p| path.starts_with(p)) {
        return Err(LedgerError::Configuration(format!(
            "Ledger path cannot be in system directory {prefix}: {}",
            path.display()
        )));
    }

    Ok(())
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn get(&self, id: &MessageId) -> crate::Result<Option<LedgerEntry>> {
        self.read_entry(id).await
    }

    async fn put(&self, entry: &LedgerEntry, condition: Condition) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_entry(&entry.message_id).await?;
        if !condition.holds(current.as_ref()) {
            return Err(LedgerError::ConditionFailed(entry.message_id.clone()));
        }

        let target = self.entry_path(&entry.message_id);
        let temp = self
            .path
            .join(format!("{}.{ENTRY_EXTENSION}{TEMP_SUFFIX}", entry.message_id));

        fs::write(&temp, serde_json::to_vec(entry)?).await?;
        fs::rename(&temp, &target).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::Status;

    #[test]
    fn test_path_validation() {
        assert!(FileLedgerStore::new("relative/ledger").is_err());
        assert!(FileLedgerStore::new("/var/lib/../etc/ledger").is_err());
        assert!(FileLedgerStore::new("/etc/mailrelay").is_err());
        assert!(FileLedgerStore::new("/proc/ledger").is_err());
        assert!(FileLedgerStore::new("/var/lib/mailrelay/ledger").is_ok());
    }

    #[test]
    fn test_deserialize_validates_path() {
        let ok: Result<FileLedgerStore, _> = ron::from_str("(path: \"/var/lib/mailrelay\")");
        assert!(ok.is_ok());

        let bad: Result<FileLedgerStore, _> = ron::from_str("(path: \"/etc/ledger\")");
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path()).unwrap();
        store.init().unwrap();

        let id = MessageId::new("m1").unwrap();
        assert!(store.get(&id).await.unwrap().is_none());

        let entry = LedgerEntry::first_sighting(id.clone(), 42);
        store.put(&entry, Condition::NotExists).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(entry.clone()));

        let err = store.put(&entry, Condition::NotExists).await.unwrap_err();
        assert!(matches!(err, LedgerError::ConditionFailed(_)));

        let done = entry.advanced(Status::Complete, 50);
        store
            .put(
                &done,
                Condition::Unchanged {
                    status: Status::InProgress,
                    consumption_count: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(done));
        assert!(dir.path().join("m1.json").exists());
    }

    #[tokio::test]
    async fn test_init_removes_orphaned_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m9.json.tmp"), b"{").unwrap();

        let store = FileLedgerStore::new(dir.path()).unwrap();
        store.init().unwrap();

        assert!(!dir.path().join("m9.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_init_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        let store = FileLedgerStore::new(&file).unwrap();
        assert!(matches!(
            store.init(),
            Err(LedgerError::Configuration(_))
        ));
    }
}
