use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;

use crate::{
    bookmarks::{source::SampleSource, BookmarkSource, BookmarkTreeNode},
    cache::CacheStore,
    library::{BookmarkLibrary, FolderTreeOption},
    storage::{BackendMemory, StorageManager},
};

/// Serves the sample tree until told to fail.
#[derive(Default)]
struct FlakySource {
    broken: AtomicBool,
}

#[async_trait]
impl BookmarkSource for FlakySource {
    async fn fetch_tree(&self) -> anyhow::Result<Vec<BookmarkTreeNode>> {
        if self.broken.load(Ordering::SeqCst) {
            anyhow::bail!("bookmarks api unavailable");
        }
        Ok(SampleSource::tree())
    }
}

struct EmptySource;

#[async_trait]
impl BookmarkSource for EmptySource {
    async fn fetch_tree(&self) -> anyhow::Result<Vec<BookmarkTreeNode>> {
        Ok(vec![])
    }
}

fn library_with(storage: Arc<BackendMemory>, source: Arc<dyn BookmarkSource>) -> Arc<BookmarkLibrary> {
    Arc::new(BookmarkLibrary::new(CacheStore::new(storage), source))
}

fn ids<T>(values: &[T], id: impl Fn(&T) -> &str) -> Vec<String> {
    values.iter().map(|v| id(v).to_string()).collect()
}

#[tokio::test]
async fn test_refresh_builds_and_persists() {
    let storage = Arc::new(BackendMemory::new());
    let library = library_with(storage.clone(), Arc::new(SampleSource));

    assert!(library.refresh("1").await);
    let state = library.state();
    assert!(!state.is_loading);
    assert_eq!(state.last_error, None);

    let index = library.index();
    assert_eq!(index.folders().len(), 4);
    assert_eq!(index.items().len(), 4);
    assert!(index.last_updated_at().is_some());
    assert_eq!(library.current_folder_id(), "1");

    // a fresh library starts from what was persisted
    let other = library_with(storage, Arc::new(EmptySource));
    assert!(other.load_cache("12").await);
    assert_eq!(other.current_folder_id(), "12");
    assert_eq!(other.index().items(), index.items());
}

#[tokio::test]
async fn test_unknown_entry_folder_falls_back_to_root() {
    let library = library_with(Arc::new(BackendMemory::new()), Arc::new(SampleSource));
    assert!(library.refresh("does-not-exist").await);

    assert_eq!(library.root_folder_id().as_deref(), Some("0"));
    assert_eq!(library.current_folder_id(), "0");
}

#[tokio::test]
async fn test_navigation() {
    let library = library_with(Arc::new(BackendMemory::new()), Arc::new(SampleSource));
    library.refresh("1").await;

    assert_eq!(ids(&library.current_folders(), |f| f.id.as_str()), vec!["12"]);
    assert_eq!(ids(&library.current_bookmarks(), |b| b.id.as_str()), vec!["10", "11"]);

    assert!(!library.set_current_folder("404"));
    assert_eq!(library.current_folder_id(), "1");

    assert!(library.set_current_folder("12"));
    assert_eq!(ids(&library.breadcrumbs(), |f| f.id.as_str()), vec!["0", "1", "12"]);
    assert_eq!(library.current_folder().unwrap().folder_path, "Bookmarks bar/Toolbox");

    assert!(library.go_to_parent());
    assert_eq!(library.current_folder_id(), "1");
    assert!(library.go_to_parent());
    assert_eq!(library.current_folder_id(), "0");
    // the root has nowhere to go
    assert!(!library.go_to_parent());
    assert_eq!(library.current_folder_id(), "0");
}

#[tokio::test]
async fn test_folder_tree_options() {
    let library = library_with(Arc::new(BackendMemory::new()), Arc::new(SampleSource));
    assert!(library.folder_tree_options().is_empty());

    library.refresh("1").await;

    let option = |value: &str, title: &str, children| FolderTreeOption {
        value: value.to_string(),
        title: title.to_string(),
        children,
    };
    assert_eq!(
        library.folder_tree_options(),
        vec![
            option("1", "Bookmarks bar", vec![option("12", "Toolbox", vec![])]),
            option("2", "Other bookmarks", vec![]),
        ]
    );

    let json = serde_json::to_value(library.folder_tree_options()).unwrap();
    assert!(json[1].get("children").is_none());
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_state() {
    let storage = Arc::new(BackendMemory::new());
    let source = Arc::new(FlakySource::default());
    let library = library_with(storage.clone(), source.clone());

    assert!(library.refresh("1").await);
    let before = library.index();
    let cached = storage.get(crate::cache::BOOKMARKS_CACHE_KEY).await.unwrap();

    source.broken.store(true, Ordering::SeqCst);
    assert!(!library.refresh("1").await);

    let state = library.state();
    assert!(!state.is_loading);
    assert!(state.last_error.unwrap().contains("unavailable"));
    assert!(Arc::ptr_eq(&before, &library.index()));
    assert_eq!(storage.get(crate::cache::BOOKMARKS_CACHE_KEY).await.unwrap(), cached);

    // the next good refresh clears the error
    source.broken.store(false, Ordering::SeqCst);
    assert!(library.refresh("1").await);
    assert_eq!(library.state().last_error, None);
}

#[tokio::test]
async fn test_empty_tree_is_not_adopted() {
    let storage = Arc::new(BackendMemory::new());
    let library = library_with(storage.clone(), Arc::new(EmptySource));

    assert!(!library.refresh("1").await);
    assert!(library.state().last_error.is_some());
    assert!(library.index().folders().is_empty());
    assert!(storage.get(crate::cache::BOOKMARKS_CACHE_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bootstrap_serves_cache_then_refreshes() {
    let storage = Arc::new(BackendMemory::new());
    library_with(storage.clone(), Arc::new(SampleSource))
        .refresh("1")
        .await;

    let source = Arc::new(FlakySource::default());
    source.broken.store(true, Ordering::SeqCst);
    let library = library_with(storage, source);

    let refresh = library.bootstrap("12").await;
    // ready with cached data before the background refresh is done
    assert!(library.state().is_ready);
    assert_eq!(library.current_folder_id(), "12");
    assert_eq!(library.index().items().len(), 4);

    refresh.await.unwrap();
    assert!(library.state().last_error.is_some());
    assert_eq!(library.index().items().len(), 4);
}

#[tokio::test]
async fn test_bootstrap_without_cache() {
    let library = library_with(Arc::new(BackendMemory::new()), Arc::new(SampleSource));

    let refresh = library.bootstrap("1").await;
    assert!(library.state().is_ready);

    refresh.await.unwrap();
    assert_eq!(library.current_folder_id(), "1");
    assert_eq!(library.index().folders().len(), 4);
}

#[tokio::test]
async fn test_search() {
    let library = library_with(Arc::new(BackendMemory::new()), Arc::new(SampleSource));
    assert!(library.search("rust", None).is_empty());

    library.refresh("1").await;

    let results = library.search("git", None);
    assert_eq!(ids(&results, |b| b.id.as_str()), vec!["120"]);

    // folder path hits count too
    let results = library.search("toolbox", Some(10));
    assert_eq!(ids(&results, |b| b.id.as_str()), vec!["120"]);

    assert!(library.search("   ", None).is_empty());
}
