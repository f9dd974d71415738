//! In-memory bookmark library: the resident index, folder navigation and the
//! cache-first bootstrap.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::bail;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{
    bookmarks::{self, build_index, BookmarkIndexItem, BookmarkSource, FolderNode},
    cache::{now_millis, CachePayload, CacheStore},
};

/// Immutable snapshot of folders and items with id lookups. Replaced as a
/// whole on every load.
#[derive(Debug, Default)]
pub struct BookmarkIndex {
    folders: Vec<FolderNode>,
    items: Vec<BookmarkIndexItem>,
    folder_positions: HashMap<String, usize>,
    item_positions: HashMap<String, usize>,
    last_updated_at: Option<i64>,
}

impl BookmarkIndex {
    pub fn new(folders: Vec<FolderNode>, items: Vec<BookmarkIndexItem>, last_updated_at: Option<i64>) -> Self {
        let folder_positions = folders
            .iter()
            .enumerate()
            .map(|(pos, folder)| (folder.id.clone(), pos))
            .collect();
        let item_positions = items
            .iter()
            .enumerate()
            .map(|(pos, item)| (item.id.clone(), pos))
            .collect();

        Self {
            folders,
            items,
            folder_positions,
            item_positions,
            last_updated_at,
        }
    }

    pub fn folders(&self) -> &[FolderNode] {
        &self.folders
    }

    pub fn items(&self) -> &[BookmarkIndexItem] {
        &self.items
    }

    pub fn last_updated_at(&self) -> Option<i64> {
        self.last_updated_at
    }

    pub fn folder(&self, id: &str) -> Option<&FolderNode> {
        self.folder_positions.get(id).map(|&pos| &self.folders[pos])
    }

    pub fn item(&self, id: &str) -> Option<&BookmarkIndexItem> {
        self.item_positions.get(id).map(|&pos| &self.items[pos])
    }

    /// First folder without a parent.
    pub fn root_folder_id(&self) -> Option<&str> {
        self.folders
            .iter()
            .find(|folder| folder.parent_id.is_none())
            .map(|folder| folder.id.as_str())
    }

    /// Folders from the root down to `folder_id`; stops at the first
    /// unknown parent.
    pub fn breadcrumbs(&self, folder_id: &str) -> Vec<&FolderNode> {
        let mut trail = vec![];
        let mut seen = HashSet::new();
        let mut current = self.folder(folder_id);

        while let Some(folder) = current {
            if !seen.insert(folder.id.as_str()) {
                log::warn!("folder {} is its own ancestor", folder.id);
                break;
            }
            trail.push(folder);
            current = folder.parent_id.as_deref().and_then(|id| self.folder(id));
        }

        trail.reverse();
        trail
    }

    pub fn child_folders(&self, folder: &FolderNode) -> Vec<&FolderNode> {
        folder
            .child_folder_ids
            .iter()
            .filter_map(|id| self.folder(id))
            .collect()
    }

    pub fn child_bookmarks(&self, folder: &FolderNode) -> Vec<&BookmarkIndexItem> {
        folder
            .child_bookmark_ids
            .iter()
            .filter_map(|id| self.item(id))
            .collect()
    }

    /// Nested folder picker entries for everything below the root.
    pub fn folder_tree_options(&self) -> Vec<FolderTreeOption> {
        let Some(root) = self.root_folder_id().and_then(|id| self.folder(id)) else {
            return vec![];
        };

        // preorder walk, then build bottom-up so no recursion is needed
        let mut order = vec![];
        let mut seen = HashSet::from([root.id.as_str()]);
        let mut stack: Vec<&str> = root.child_folder_ids.iter().rev().map(String::as_str).collect();
        while let Some(id) = stack.pop() {
            let Some(folder) = self.folder(id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            order.push(folder);
            stack.extend(folder.child_folder_ids.iter().rev().map(String::as_str));
        }

        let mut built: HashMap<&str, FolderTreeOption> = HashMap::new();
        for folder in order.into_iter().rev() {
            let children = folder
                .child_folder_ids
                .iter()
                .filter_map(|id| built.remove(id.as_str()))
                .collect();
            built.insert(
                folder.id.as_str(),
                FolderTreeOption {
                    value: folder.id.clone(),
                    title: folder.title.clone(),
                    children,
                },
            );
        }

        root.child_folder_ids
            .iter()
            .filter_map(|id| built.remove(id.as_str()))
            .collect()
    }
}

impl From<CachePayload> for BookmarkIndex {
    fn from(payload: CachePayload) -> Self {
        Self::new(payload.folder_nodes, payload.bookmark_items, Some(payload.generated_at))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderTreeOption {
    pub value: String,
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FolderTreeOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadState {
    pub is_ready: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

pub struct BookmarkLibrary {
    cache: CacheStore,
    source: Arc<dyn BookmarkSource>,
    index: RwLock<Arc<BookmarkIndex>>,
    current_folder_id: RwLock<String>,
    state: RwLock<LoadState>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BookmarkLibrary {
    pub fn new(cache: CacheStore, source: Arc<dyn BookmarkSource>) -> Self {
        Self {
            cache,
            source,
            index: RwLock::new(Arc::new(BookmarkIndex::default())),
            current_folder_id: RwLock::new(String::new()),
            state: RwLock::new(LoadState::default()),
        }
    }

    pub fn index(&self) -> Arc<BookmarkIndex> {
        read(&self.index).clone()
    }

    pub fn state(&self) -> LoadState {
        read(&self.state).clone()
    }

    pub fn current_folder_id(&self) -> String {
        read(&self.current_folder_id).clone()
    }

    fn adopt(&self, index: BookmarkIndex, entry_folder_id: &str) {
        *write(&self.index) = Arc::new(index);
        if !self.set_current_folder(entry_folder_id) {
            if let Some(root) = self.root_folder_id() {
                self.set_current_folder(&root);
            }
        }
    }

    /// Adopts the cached index when there is a valid one. Returns whether
    /// anything was loaded.
    pub async fn load_cache(&self, entry_folder_id: &str) -> bool {
        let Some(payload) = self.cache.load().await else {
            return false;
        };

        let index = BookmarkIndex::from(payload);
        log::info!(
            "bookmark cache loaded: {} folders, {} bookmarks",
            index.folders().len(),
            index.items().len()
        );
        self.adopt(index, entry_folder_id);
        true
    }

    async fn rebuild(&self) -> anyhow::Result<BookmarkIndex> {
        let tree = self.source.fetch_tree().await?;
        let built = build_index(&tree);
        if built.is_empty() {
            bail!("bookmark source returned no folders");
        }

        let last_updated_at = match self
            .cache
            .save(built.folder_nodes.clone(), built.bookmark_items.clone())
            .await
        {
            Some(payload) => payload.generated_at,
            None => now_millis(),
        };

        Ok(BookmarkIndex::new(
            built.folder_nodes,
            built.bookmark_items,
            Some(last_updated_at),
        ))
    }

    /// Reads the source again, rebuilds the index and persists it. On failure
    /// the resident index and the cache are left as they were.
    pub async fn refresh(&self, entry_folder_id: &str) -> bool {
        {
            let mut state = write(&self.state);
            state.is_loading = true;
            state.last_error = None;
        }

        let result = self.rebuild().await;

        let ok = match result {
            Ok(index) => {
                log::info!(
                    "bookmarks refreshed: {} folders, {} bookmarks",
                    index.folders().len(),
                    index.items().len()
                );
                self.adopt(index, entry_folder_id);
                true
            }
            Err(err) => {
                log::error!("failed to read bookmarks: {err:#}");
                write(&self.state).last_error = Some(format!("{err:#}"));
                false
            }
        };

        write(&self.state).is_loading = false;
        ok
    }

    /// Loads the cache, marks the library ready and refreshes in the
    /// background.
    pub async fn bootstrap(self: &Arc<Self>, entry_folder_id: &str) -> JoinHandle<()> {
        self.load_cache(entry_folder_id).await;
        write(&self.state).is_ready = true;

        let library = self.clone();
        let entry_folder_id = entry_folder_id.to_string();
        tokio::spawn(async move {
            library.refresh(&entry_folder_id).await;
        })
    }

    /// Returns `false` and changes nothing when the folder is unknown.
    pub fn set_current_folder(&self, folder_id: &str) -> bool {
        if self.index().folder(folder_id).is_none() {
            return false;
        }
        *write(&self.current_folder_id) = folder_id.to_string();
        true
    }

    pub fn go_to_parent(&self) -> bool {
        let parent_id = self.current_folder().and_then(|folder| folder.parent_id);
        match parent_id {
            Some(parent_id) => self.set_current_folder(&parent_id),
            None => false,
        }
    }

    pub fn current_folder(&self) -> Option<FolderNode> {
        self.index().folder(&self.current_folder_id()).cloned()
    }

    pub fn current_folders(&self) -> Vec<FolderNode> {
        let index = self.index();
        let Some(folder) = index.folder(&self.current_folder_id()) else {
            return vec![];
        };
        index.child_folders(folder).into_iter().cloned().collect()
    }

    pub fn current_bookmarks(&self) -> Vec<BookmarkIndexItem> {
        let index = self.index();
        let Some(folder) = index.folder(&self.current_folder_id()) else {
            return vec![];
        };
        index.child_bookmarks(folder).into_iter().cloned().collect()
    }

    pub fn breadcrumbs(&self) -> Vec<FolderNode> {
        self.index()
            .breadcrumbs(&self.current_folder_id())
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn root_folder_id(&self) -> Option<String> {
        self.index().root_folder_id().map(String::from)
    }

    pub fn folder_tree_options(&self) -> Vec<FolderTreeOption> {
        self.index().folder_tree_options()
    }

    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<BookmarkIndexItem> {
        let index = self.index();
        bookmarks::search(index.items(), query, limit)
            .into_iter()
            .cloned()
            .collect()
    }
}
