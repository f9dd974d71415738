use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::RwLock,
};

use async_trait::async_trait;
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("json error: {0:?}")]
    Json(#[from] serde_json::Error),

    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}

/// Key-value primitive the caches are persisted through.
///
/// Values are arbitrary JSON documents; a single `set` either replaces the
/// whole value or leaves the previous one in place.
#[async_trait]
pub trait StorageManager: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", sanitize_key(key)))
    }
}

/// Keys map onto file names, so anything outside `[A-Za-z0-9_.-]` is replaced.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl StorageManager for BackendLocal {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let data = match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(serde_json::from_slice(&data)?))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let temp_path = self.base_dir.join(format!(
            "{}-{}.tmp",
            rusty_ulid::generate_ulid_string(),
            sanitize_key(key)
        ));

        let data = serde_json::to_vec(value)?;
        if let Err(err) = tokio::fs::write(&temp_path, &data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Process-local store, used when no data directory is usable and in tests.
#[derive(Debug, Default)]
pub struct BackendMemory {
    values: RwLock<HashMap<String, Value>>,
}

impl BackendMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageManager for BackendMemory {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let values = self
            .values
            .read()
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut values = self
            .values
            .write()
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;
        values.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self
            .values
            .write()
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;
        values.remove(key);
        Ok(())
    }
}
