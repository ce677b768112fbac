//! Path-addressable asset storage.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha3::{Digest, Sha3_256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{HarvestError, Result};

/// Where accepted originals and rendered variants end up.
///
/// Keys are relative, `/`-separated paths such as `originals/ab12.jpg`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Write `bytes` under `key`, replacing anything already there.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<PathBuf>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// The path `key` maps to, whether or not it exists yet.
    fn locate(&self, key: &str) -> Result<PathBuf>;
}

/// Content-addressed key for an original: `originals/<sha3-256 prefix>.<ext>`.
pub fn content_key(bytes: &[u8], content_type: &str) -> String {
    let digest = Sha3_256::digest(bytes);
    let prefix = hex::encode(&digest[..8]);
    format!("originals/{prefix}.{}", extension_for(content_type))
}

/// File extension for an image MIME type.
pub fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/avif" => "avif",
        _ => "img",
    }
}

fn validate_key(key: &str) -> Result<&Path> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(path)
    } else {
        Err(HarvestError::StorageError(format!("Invalid asset key '{key}'")))
    }
}

/// Asset store rooted at a local directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written file.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let target = self.locate(key)?;
        let storage_err = |e: std::io::Error| {
            HarvestError::StorageError(format!("Failed to write {}: {e}", target.display()))
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }

        let tmp = target.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_data().await?;
            tokio::fs::rename(&tmp, &target).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage_err(e));
        }

        debug!(key, bytes = bytes.len(), path = %target.display(), "Asset stored");
        Ok(target)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.locate(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| HarvestError::StorageError(format!("Failed to stat {}: {e}", path.display())))
    }

    fn locate(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }
}

/// In-memory asset store for tests. Paths are virtual.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    objects: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.locate(key)?;
        self.objects
            .lock()
            .map_err(|_| HarvestError::StorageError("memory store poisoned".into()))?
            .insert(key.to_string(), bytes.to_vec());
        Ok(path)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.get(key).is_some())
    }

    fn locate(&self, key: &str) -> Result<PathBuf> {
        Ok(Path::new("memory://").join(validate_key(key)?))
    }
}
