//! Object storage holding the raw inbound messages

use std::{
    fmt::Debug,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::fs;

use crate::error::ObjectStoreError;

/// Read access to the bucket the receiving service writes raw mail into
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Fetch the full contents of `bucket`/`key`
    ///
    /// # Errors
    /// [`ObjectStoreError::NotFound`] when the object does not exist, or a
    /// backend specific error.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// Objects kept in process memory, used for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: impl Into<String>, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.insert((bucket.into(), key.into()), data.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|data| data.value().clone())
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

/// Objects stored as files at `{root}/{bucket}/{key}`
///
/// Keys may contain `/` to address nested directories, but neither the
/// bucket nor the key may climb out of the root.
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl<'de> Deserialize<'de> for FileObjectStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileObjectStoreHelper {
            root: PathBuf,
        }

        let helper = FileObjectStoreHelper::deserialize(deserializer)?;
        Self::new(helper.root).map_err(serde::de::Error::custom)
    }
}

impl FileObjectStore {
    /// Create a store rooted at `root`
    ///
    /// # Errors
    /// If `root` is relative or contains `..`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let root = root.into();

        if !root.is_absolute() || root.components().any(|c| c == Component::ParentDir) {
            return Err(ObjectStoreError::InvalidKey(format!(
                "Object store root must be an absolute path without '..': {}",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.starts_with('.') {
            return Err(ObjectStoreError::InvalidKey(format!("bucket {bucket:?}")));
        }

        let key_path = Path::new(key);
        if key.is_empty()
            || !key_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(ObjectStoreError::InvalidKey(format!("key {key:?}")));
        }

        Ok(self.root.join(bucket).join(key_path))
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(ObjectStoreError::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Where raw inbound messages are read from
#[derive(Debug, Clone, Deserialize)]
pub enum ObjectStoreConfig {
    File(FileObjectStore),
}

impl ObjectStoreConfig {
    pub fn into_store(self) -> Arc<dyn ObjectStore> {
        match self {
            Self::File(store) => Arc::new(store),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryObjectStore::new();
        store.insert("mail", "inbox/1", b"raw".to_vec());

        assert_eq!(store.fetch("mail", "inbox/1").await.unwrap(), b"raw");
        assert!(matches!(
            store.fetch("mail", "inbox/2").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_store_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mail/inbox")).unwrap();
        std::fs::write(dir.path().join("mail/inbox/abc"), b"Subject: hi\r\n\r\n").unwrap();

        let store = FileObjectStore::new(dir.path()).unwrap();
        assert_eq!(
            store.fetch("mail", "inbox/abc").await.unwrap(),
            b"Subject: hi\r\n\r\n"
        );
        assert!(matches!(
            store.fetch("mail", "inbox/missing").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path()).unwrap();

        for (bucket, key) in [
            ("mail", "../secret"),
            ("mail", "/etc/passwd"),
            ("mail", "a/../../b"),
            ("..", "key"),
            ("a/b", "key"),
            ("mail", ""),
            ("", "key"),
        ] {
            assert!(
                matches!(
                    store.fetch(bucket, key).await,
                    Err(ObjectStoreError::InvalidKey(_))
                ),
                "{bucket}/{key} should be rejected"
            );
        }
    }

    #[test]
    fn test_root_validation() {
        assert!(FileObjectStore::new("relative").is_err());
        assert!(FileObjectStore::new("/srv/../etc").is_err());

        let store: FileObjectStore = ron::from_str("(root: \"/srv/mail\")").unwrap();
        assert_eq!(store.root(), Path::new("/srv/mail"));
    }
}
