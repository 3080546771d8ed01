//! Key-addressed durable blob storage
//!
//! Both progress snapshots and model checkpoints go through a [`BlobStore`].
//! Keys are `/`-separated relative paths such as `progress/<task id>` or
//! `models/mining/v3`. Writes are atomic per key.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::EngineError;

/// Durable key/value storage for opaque byte blobs
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob; `None` if the key does not exist
    async fn get(&self, key: &str) -> crate::Result<Option<Vec<u8>>>;

    /// Write a blob, replacing any previous value atomically
    async fn put(&self, key: &str, bytes: &[u8]) -> crate::Result<()>;

    /// Remove a blob. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> crate::Result<()>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> crate::Result<Vec<String>>;
}

#[async_trait]
impl<T> BlobStore for Arc<T>
where
    T: BlobStore + ?Sized,
{
    async fn get(&self, key: &str) -> crate::Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> crate::Result<()> {
        (**self).put(key, bytes).await
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        (**self).delete(key).await
    }

    async fn list(&self, prefix: &str) -> crate::Result<Vec<String>> {
        (**self).list(prefix).await
    }
}

const TEMP_SUFFIX: &str = ".tmp";

/// Blob store rooted at a directory on the local filesystem.
///
/// Each key maps to one file. `put` writes a sibling temp file, syncs it
/// and renames it over the target so a crash mid-write leaves the previous
/// value intact.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> crate::Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(EngineError::persistence(format!("invalid blob key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }

    async fn collect_keys(&self, dir: PathBuf, out: &mut Vec<String>) -> crate::Result<()> {
        let mut stack = vec![dir];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                    continue;
                }
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> crate::Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::persistence(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> crate::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::persistence(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        let write = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &path).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp).await;
            return Err(EngineError::persistence(format!(
                "failed to write {}: {e}",
                path.display()
            )));
        }

        debug!(key, bytes = bytes.len(), "Blob written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::persistence(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> crate::Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(self.root.clone(), &mut keys).await?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

/// In-process blob store, used by tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    /// Whether the store holds no blobs
    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> crate::Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> crate::Result<()> {
        self.blobs.lock().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        self.blobs.lock().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> crate::Result<Vec<String>> {
        Ok(self
            .blobs
            .lock()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
