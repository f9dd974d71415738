//! Persistent preview records and the recency-ordered eviction over them.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    images::{EncodedImage, PreviewFormat},
    storage::StorageError,
};

pub const DEFAULT_MAX_CACHE_ITEMS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRecord {
    pub url: String,
    /// Unix time in milliseconds.
    pub updated_at: i64,
    pub image: EncodedImage,
}

/// Position of a record in the `updated_at` index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreviewKey {
    pub updated_at: i64,
    pub url: String,
}

#[async_trait]
pub trait PreviewStore: Send + Sync {
    async fn get(&self, url: &str) -> Result<Option<PreviewRecord>, StorageError>;

    /// Inserts or replaces the record for `record.url`.
    async fn put(&self, record: PreviewRecord) -> Result<(), StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;

    /// Up to `limit` keys, oldest `updated_at` first.
    async fn oldest(&self, limit: usize) -> Result<Vec<PreviewKey>, StorageError>;

    /// Deletes the record `key` points at. Returns `false` when the record
    /// is gone or was rewritten since `key` was read.
    async fn delete(&self, key: &PreviewKey) -> Result<bool, StorageError>;
}

#[derive(Debug, Default)]
struct RecencyIndex {
    by_url: HashMap<String, i64>,
    by_time: BTreeSet<PreviewKey>,
}

impl RecencyIndex {
    fn insert(&mut self, url: &str, updated_at: i64) {
        if let Some(previous) = self.by_url.insert(url.to_string(), updated_at) {
            self.by_time.remove(&PreviewKey {
                updated_at: previous,
                url: url.to_string(),
            });
        }
        self.by_time.insert(PreviewKey {
            updated_at,
            url: url.to_string(),
        });
    }

    fn matches(&self, key: &PreviewKey) -> bool {
        self.by_url.get(&key.url) == Some(&key.updated_at)
    }

    fn remove(&mut self, key: &PreviewKey) {
        self.by_url.remove(&key.url);
        self.by_time.remove(key);
    }

    fn oldest(&self, limit: usize) -> Vec<PreviewKey> {
        self.by_time.iter().take(limit).cloned().collect()
    }
}

fn lock_poisoned<T>(err: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

/// Keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryPreviewStore {
    inner: Mutex<(HashMap<String, PreviewRecord>, RecencyIndex)>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreviewStore for MemoryPreviewStore {
    async fn get(&self, url: &str) -> Result<Option<PreviewRecord>, StorageError> {
        let inner = self.inner.lock().map_err(lock_poisoned)?;
        Ok(inner.0.get(url).cloned())
    }

    async fn put(&self, record: PreviewRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(lock_poisoned)?;
        inner.1.insert(&record.url, record.updated_at);
        inner.0.insert(record.url.clone(), record);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let inner = self.inner.lock().map_err(lock_poisoned)?;
        Ok(inner.0.len())
    }

    async fn oldest(&self, limit: usize) -> Result<Vec<PreviewKey>, StorageError> {
        let inner = self.inner.lock().map_err(lock_poisoned)?;
        Ok(inner.1.oldest(limit))
    }

    async fn delete(&self, key: &PreviewKey) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().map_err(lock_poisoned)?;
        if !inner.1.matches(key) {
            return Ok(false);
        }
        inner.1.remove(key);
        inner.0.remove(&key.url);
        Ok(true)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordFile {
    url: String,
    updated_at: i64,
    format: PreviewFormat,
    /// base64
    image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordHeader {
    url: String,
    updated_at: i64,
}

/// One JSON file per url, named after the SHA-256 of the url.
///
/// The `updated_at` index lives in memory and is rebuilt from the record
/// files when the store is opened. Writes go through a temp file + rename.
#[derive(Debug)]
pub struct DiskPreviewStore {
    dir: PathBuf,
    index: Mutex<RecencyIndex>,
    write_lock: tokio::sync::Mutex<()>,
}

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

impl DiskPreviewStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut index = RecencyIndex::default();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(RECORD_EXTENSION) => {}
                Some(TEMP_EXTENSION) => {
                    // left behind by a write that never reached the rename
                    log::debug!("removing unfinished preview write {}", path.display());
                    let _ = tokio::fs::remove_file(&path).await;
                    continue;
                }
                _ => continue,
            }

            let header = tokio::fs::read(&path)
                .await
                .map_err(StorageError::from)
                .and_then(|data| Ok(serde_json::from_slice::<RecordHeader>(&data)?));

            match header {
                Ok(header) => index.insert(&header.url, header.updated_at),
                Err(err) => {
                    log::warn!("dropping unreadable preview record {}: {err}", path.display());
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        log::debug!("opened preview store at {} with {} records", dir.display(), index.by_url.len());

        Ok(Self {
            dir,
            index: Mutex::new(index),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn record_path(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }
}

#[async_trait]
impl PreviewStore for DiskPreviewStore {
    async fn get(&self, url: &str) -> Result<Option<PreviewRecord>, StorageError> {
        let data = match tokio::fs::read(self.record_path(url)).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let file: RecordFile = serde_json::from_slice(&data)?;
        if file.url != url {
            // sha-256 collision or a hand-edited file
            return Ok(None);
        }

        let bytes = STANDARD
            .decode(file.image.as_bytes())
            .map_err(|err| StorageError::Unavailable(format!("corrupt preview image: {err}")))?;

        Ok(Some(PreviewRecord {
            url: file.url,
            updated_at: file.updated_at,
            image: EncodedImage {
                format: file.format,
                bytes,
            },
        }))
    }

    async fn put(&self, record: PreviewRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let path = self.record_path(&record.url);
        let temp_path = path.with_extension(format!("{}.{TEMP_EXTENSION}", rusty_ulid::generate_ulid_string()));
        let file = RecordFile {
            url: record.url.clone(),
            updated_at: record.updated_at,
            format: record.image.format,
            image: STANDARD.encode(&record.image.bytes),
        };

        let data = serde_json::to_vec(&file)?;
        if let Err(err) = tokio::fs::write(&temp_path, &data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        tokio::fs::rename(&temp_path, &path).await?;

        self.index
            .lock()
            .map_err(lock_poisoned)?
            .insert(&record.url, record.updated_at);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.index.lock().map_err(lock_poisoned)?.by_url.len())
    }

    async fn oldest(&self, limit: usize) -> Result<Vec<PreviewKey>, StorageError> {
        Ok(self.index.lock().map_err(lock_poisoned)?.oldest(limit))
    }

    async fn delete(&self, key: &PreviewKey) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;

        if !self.index.lock().map_err(lock_poisoned)?.matches(key) {
            return Ok(false);
        }

        match tokio::fs::remove_file(self.record_path(&key.url)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        self.index.lock().map_err(lock_poisoned)?.remove(key);
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Records over the limit when eviction started.
    pub requested: usize,
    pub deleted: usize,
}

/// Deletes oldest records until at most `max_items` remain.
///
/// Best effort: the first failing store call ends the walk. An oversized
/// cache only costs disk space, reads stay correct.
pub async fn evict_oldest(store: &dyn PreviewStore, max_items: usize) -> EvictionReport {
    if max_items == 0 {
        return EvictionReport::default();
    }

    let total = match store.count().await {
        Ok(total) => total,
        Err(err) => {
            log::debug!("preview eviction skipped, count failed: {err}");
            return EvictionReport::default();
        }
    };

    if total <= max_items {
        return EvictionReport::default();
    }

    let requested = total - max_items;
    let mut report = EvictionReport {
        requested,
        deleted: 0,
    };

    // stale keys are skipped, so keep widening the window past them
    let mut skipped: HashSet<PreviewKey> = HashSet::new();
    while report.deleted < requested {
        let window = requested - report.deleted + skipped.len();
        let keys = match store.oldest(window).await {
            Ok(keys) => keys,
            Err(err) => {
                log::debug!("preview eviction aborted, index walk failed: {err}");
                return report;
            }
        };

        let fresh: Vec<_> = keys.into_iter().filter(|key| !skipped.contains(key)).collect();
        if fresh.is_empty() {
            break;
        }

        for key in fresh {
            if report.deleted >= requested {
                break;
            }

            match store.delete(&key).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => {
                    skipped.insert(key);
                }
                Err(err) => {
                    log::debug!("preview eviction aborted at {}: {err}", key.url);
                    return report;
                }
            }
        }
    }

    if report.deleted < requested {
        log::warn!(
            "preview eviction removed {} of {} records, index exhausted early",
            report.deleted,
            requested
        );
    } else {
        log::debug!("evicted {} preview records", report.deleted);
    }

    report
}
