//! Persistence boundary for the hash registry.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::hash::{HashAlgorithm, PerceptualHash};

/// Append-only store of accepted hashes.
#[async_trait]
pub trait HashLog: Send + Sync {
    /// Every hash recorded so far, in append order.
    async fn list_all(&self) -> Result<Vec<PerceptualHash>>;

    /// Durably record `hash`. Returns only once the record is persisted.
    async fn append(&self, hash: &PerceptualHash) -> Result<()>;

    /// Push anything still buffered to durable storage.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// One line of the JSON-lines log.
#[derive(Debug, Serialize, Deserialize)]
struct HashRecord {
    algorithm: HashAlgorithm,
    hash: String,
    recorded_at: DateTime<Utc>,
}

/// JSON-lines hash log on the local filesystem.
///
/// Each append is written as a single line and followed by `sync_data`, so a
/// crash loses at most the line being written. A torn final line left by such
/// a crash is terminated before the next append, keeping later records on
/// their own line. Lines that fail to parse are skipped on load.
#[derive(Debug)]
pub struct FileHashLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileHashLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HashLog for FileHashLog {
    async fn list_all(&self) -> Result<Vec<PerceptualHash>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No hash log yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(HarvestError::RegistryPersistenceFailed(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let mut hashes = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<HashRecord>(line)
                .map_err(|e| e.to_string())
                .and_then(|record| {
                    PerceptualHash::from_hex(&record.hash, record.algorithm)
                        .map_err(|e| e.to_string())
                });
            match parsed {
                Ok(hash) => hashes.push(hash),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping malformed hash log line"
                ),
            }
        }

        Ok(hashes)
    }

    async fn append(&self, hash: &PerceptualHash) -> Result<()> {
        let persist_err = |e: std::io::Error| {
            HarvestError::RegistryPersistenceFailed(format!(
                "Failed to append to {}: {e}",
                self.path.display()
            ))
        };

        let record = HashRecord {
            algorithm: hash.algorithm,
            hash: hash.to_hex(),
            recorded_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| HarvestError::RegistryPersistenceFailed(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(persist_err)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(persist_err)?;

        let len = file.metadata().await.map_err(persist_err)?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1)).await.map_err(persist_err)?;
            file.read_exact(&mut last).await.map_err(persist_err)?;
            if last[0] != b'\n' {
                warn!(path = %self.path.display(), "Hash log ends in a torn line, terminating it");
                line.insert(0, '\n');
            }
        }

        file.write_all(line.as_bytes()).await.map_err(persist_err)?;
        file.sync_data().await.map_err(persist_err)?;

        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::File::open(&self.path).await {
            Ok(file) => file.sync_all().await.map_err(|e| {
                HarvestError::RegistryPersistenceFailed(format!(
                    "Failed to sync {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HarvestError::RegistryPersistenceFailed(format!(
                "Failed to open {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory hash log for tests; can be told to fail appends.
#[derive(Debug, Default)]
pub struct MemoryHashLog {
    hashes: std::sync::Mutex<Vec<PerceptualHash>>,
    fail_appends: AtomicBool,
    flushes: AtomicUsize,
}

impl MemoryHashLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated log, as if a previous run had accepted `hashes`.
    pub fn with_hashes(hashes: Vec<PerceptualHash>) -> Self {
        Self {
            hashes: std::sync::Mutex::new(hashes),
            ..Self::default()
        }
    }

    /// A log whose appends always fail.
    pub fn failing() -> Self {
        let log = Self::default();
        log.set_failing(true);
        log
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<PerceptualHash> {
        self.hashes
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HashLog for MemoryHashLog {
    async fn list_all(&self) -> Result<Vec<PerceptualHash>> {
        Ok(self.snapshot())
    }

    async fn append(&self, hash: &PerceptualHash) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(HarvestError::RegistryPersistenceFailed(
                "memory log configured to fail".into(),
            ));
        }
        self.hashes
            .lock()
            .map_err(|_| HarvestError::RegistryPersistenceFailed("memory log poisoned".into()))?
            .push(hash.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
