//! Persistent perceptual-hash registry.
//!
//! The registry answers "is this image a near-duplicate of something already
//! kept?" and owns the only cross-run state of the system. All mutation goes
//! through [`HashRegistry::admit`], which runs check, store and append under
//! one lock so two concurrent near-duplicates can never both be accepted.
//!
//! ```no_run
//! use harvest_core::registry::{FileHashLog, HashRegistry};
//!
//! # async fn example() -> harvest_core::Result<()> {
//! let registry = HashRegistry::open(FileHashLog::new("downloaded_images/downloaded_hashes.jsonl")).await?;
//! println!("{} known hashes", registry.len().await);
//! # Ok(())
//! # }
//! ```

mod log;

pub use log::{FileHashLog, HashLog, MemoryHashLog};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{HarvestError, Result};
use crate::hash::PerceptualHash;

/// Outcome of [`HashRegistry::admit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Admission<T> {
    /// A stored hash was at least `threshold` similar.
    Duplicate { similarity: f64 },
    /// Not a duplicate; the store succeeded and the hash is now registered.
    Accepted(T),
}

pub struct HashRegistry {
    log: Arc<dyn HashLog>,
    hashes: Mutex<Vec<PerceptualHash>>,
}

impl std::fmt::Debug for HashRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRegistry").finish_non_exhaustive()
    }
}

impl HashRegistry {
    /// Load every hash `log` holds.
    #[instrument(level = "debug", skip_all)]
    pub async fn open(log: impl HashLog + 'static) -> Result<Self> {
        Self::open_shared(Arc::new(log)).await
    }

    pub async fn open_shared(log: Arc<dyn HashLog>) -> Result<Self> {
        let hashes = log.list_all().await?;
        info!(known_hashes = hashes.len(), "Hash registry loaded");
        Ok(Self {
            log,
            hashes: Mutex::new(hashes),
        })
    }

    /// An empty, non-persistent registry.
    pub fn in_memory() -> Self {
        Self {
            log: Arc::new(MemoryHashLog::new()),
            hashes: Mutex::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.hashes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// `true` if any registered hash is at least `threshold` similar to `hash`.
    pub async fn contains(&self, hash: &PerceptualHash, threshold: f64) -> bool {
        best_match(&self.hashes.lock().await, hash, threshold).is_some()
    }

    /// Persist `hash` and register it. No duplicate check.
    pub async fn add(&self, hash: PerceptualHash) -> Result<()> {
        let mut hashes = self.hashes.lock().await;
        self.log.append(&hash).await?;
        hashes.push(hash);
        Ok(())
    }

    /// Check `hash` against the registry, and when it is new run `store`
    /// and then persist the hash, all under the registry lock.
    ///
    /// A `store` error is returned unchanged and registers nothing. An append
    /// error comes back as `RegistryPersistenceFailed`; the stored asset then
    /// exists without a registry entry.
    #[instrument(level = "debug", skip(self, hash, store))]
    pub async fn admit<T, F, Fut>(
        &self,
        hash: &PerceptualHash,
        threshold: f64,
        store: F,
    ) -> Result<Admission<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut hashes = self.hashes.lock().await;

        if let Some(similarity) = best_match(&hashes, hash, threshold) {
            debug!(similarity, "Near-duplicate rejected");
            return Ok(Admission::Duplicate { similarity });
        }

        let stored = store().await?;

        self.log.append(hash).await.map_err(|e| match e {
            HarvestError::RegistryPersistenceFailed(_) => e,
            other => HarvestError::RegistryPersistenceFailed(other.to_string()),
        })?;
        hashes.push(hash.clone());
        debug!(known_hashes = hashes.len(), "Hash registered");

        Ok(Admission::Accepted(stored))
    }

    /// Sync the backing log. Call once when the process is shutting down.
    pub async fn flush(&self) -> Result<()> {
        let _hashes = self.hashes.lock().await;
        self.log.flush().await
    }
}

/// Highest similarity at or above `threshold`, if any.
fn best_match(known: &[PerceptualHash], hash: &PerceptualHash, threshold: f64) -> Option<f64> {
    known
        .iter()
        .map(|k| k.similarity(hash))
        .filter(|s| *s >= threshold)
        .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
}
