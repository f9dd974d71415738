//! Versioned persistence of the folder tree and the search index.
//!
//! The payload is written as one value under a single key and is trusted
//! only when its schema version matches and both collections deserialize.
//! Anything else is treated as corrupt and removed, never partially adopted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    bookmarks::{BookmarkIndexItem, FolderNode},
    storage::{StorageError, StorageManager},
};

pub const BOOKMARKS_CACHE_KEY: &str = "btc_bookmarks_cache_v1";
pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePayload {
    pub schema_version: u32,
    /// Unix time in milliseconds.
    pub generated_at: i64,
    pub folder_nodes: Vec<FolderNode>,
    pub bookmark_items: Vec<BookmarkIndexItem>,
}

impl CachePayload {
    pub fn new(folder_nodes: Vec<FolderNode>, bookmark_items: Vec<BookmarkIndexItem>) -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            generated_at: now_millis(),
            folder_nodes,
            bookmark_items,
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, PartialEq)]
enum Validation {
    Trusted(CachePayload),
    Corrupt(String),
}

fn validate(value: Value) -> Validation {
    let version = value.get("schemaVersion").and_then(Value::as_u64);
    if version != Some(u64::from(CACHE_SCHEMA_VERSION)) {
        return Validation::Corrupt(format!("unexpected schema version {version:?}"));
    }

    for field in ["folderNodes", "bookmarkItems"] {
        if !value.get(field).is_some_and(Value::is_array) {
            return Validation::Corrupt(format!("{field} is not an array"));
        }
    }

    match serde_json::from_value(value) {
        Ok(payload) => Validation::Trusted(payload),
        Err(err) => Validation::Corrupt(err.to_string()),
    }
}

#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<dyn StorageManager>,
    key: String,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn StorageManager>) -> Self {
        Self {
            storage,
            key: BOOKMARKS_CACHE_KEY.to_string(),
        }
    }

    /// Reads the cached payload. Missing, corrupt and unreadable caches all
    /// come back as `None`; corrupt ones are removed on the way.
    pub async fn load(&self) -> Option<CachePayload> {
        let value = match self.storage.get(&self.key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(StorageError::Json(err)) => {
                log::error!("bookmark cache is not valid json ({err}), discarding it");
                self.invalidate().await;
                return None;
            }
            Err(err) => {
                log::error!("failed to read bookmark cache: {err}");
                return None;
            }
        };

        match validate(value) {
            Validation::Trusted(payload) => {
                log::debug!(
                    "bookmark cache loaded: {} folders, {} bookmarks",
                    payload.folder_nodes.len(),
                    payload.bookmark_items.len()
                );
                Some(payload)
            }
            Validation::Corrupt(reason) => {
                log::error!("bookmark cache is malformed ({reason}), discarding it");
                self.invalidate().await;
                None
            }
        }
    }

    /// Replaces the cached payload as a whole. Returns the written payload,
    /// or `None` if the write failed.
    pub async fn save(
        &self,
        folder_nodes: Vec<FolderNode>,
        bookmark_items: Vec<BookmarkIndexItem>,
    ) -> Option<CachePayload> {
        let payload = CachePayload::new(folder_nodes, bookmark_items);

        let value = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(err) => {
                log::error!("failed to serialize bookmark cache: {err}");
                return None;
            }
        };

        match self.storage.set(&self.key, &value).await {
            Ok(()) => Some(payload),
            Err(err) => {
                log::error!("failed to write bookmark cache: {err}");
                None
            }
        }
    }

    pub async fn invalidate(&self) -> bool {
        match self.storage.remove(&self.key).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("failed to remove bookmark cache: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_rejects_wrong_version() {
        let value = json!({"schemaVersion": 2, "generatedAt": 1, "folderNodes": [], "bookmarkItems": []});
        assert!(matches!(validate(value), Validation::Corrupt(_)));

        let value = json!({"generatedAt": 1, "folderNodes": [], "bookmarkItems": []});
        assert!(matches!(validate(value), Validation::Corrupt(_)));
    }

    #[test]
    fn test_validate_rejects_non_arrays() {
        let value = json!({"schemaVersion": 1, "generatedAt": 1, "folderNodes": {}, "bookmarkItems": []});
        assert!(matches!(validate(value), Validation::Corrupt(_)));

        let value = json!({"schemaVersion": 1, "generatedAt": 1, "folderNodes": []});
        assert!(matches!(validate(value), Validation::Corrupt(_)));
    }

    #[test]
    fn test_validate_rejects_malformed_entries() {
        let value = json!({
            "schemaVersion": 1,
            "generatedAt": 1,
            "folderNodes": [{"id": "0"}],
            "bookmarkItems": []
        });
        assert!(matches!(validate(value), Validation::Corrupt(_)));
    }

    #[test]
    fn test_validate_accepts_empty_payload() {
        let value = json!({"schemaVersion": 1, "generatedAt": 42, "folderNodes": [], "bookmarkItems": []});
        match validate(value) {
            Validation::Trusted(payload) => assert_eq!(payload.generated_at, 42),
            other => panic!("expected trusted payload, got {other:?}"),
        }
    }
}
