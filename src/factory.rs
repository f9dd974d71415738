use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use homedir::my_home;

use crate::{
    bookmarks::source::{BookmarkSource, ChromeProfileSource, JsonTreeSource, SampleSource},
    cache::CacheStore,
    config::Config,
    library::BookmarkLibrary,
    preview::{store::DiskPreviewStore, CaptureQueue, PreviewCache, PreviewService, ViewportCapture},
    storage,
};

/// Builds the application components from config and environment.
pub struct AppFactory;

impl AppFactory {
    /// `BMC_BASE_PATH`, or `~/.local/share/bookmark-cards`.
    pub fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("BMC_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(home.join(".local/share/bookmark-cards"))
    }

    pub fn create_config() -> Result<Config> {
        let base_path = Self::get_base_path()?;
        std::fs::create_dir_all(&base_path).context("Failed to create application base directory")?;
        Config::load_with(&base_path)
    }

    /// Configured file first, then the default Chromium profile, then the
    /// built-in sample.
    pub fn create_source(config: &Config) -> Arc<dyn BookmarkSource> {
        if let Some(path) = &config.bookmarks_file {
            log::info!("reading bookmarks from {path}");
            // a Chromium profile file is always called `Bookmarks`
            let source: Arc<dyn BookmarkSource> = if path.ends_with("Bookmarks") {
                Arc::new(ChromeProfileSource::new(path))
            } else {
                Arc::new(JsonTreeSource::new(path))
            };
            return source;
        }

        if let Some(source) = ChromeProfileSource::discover() {
            log::info!("reading bookmarks from {}", source.path().display());
            return Arc::new(source);
        }

        log::warn!("no bookmark source found, using sample data");
        Arc::new(SampleSource)
    }

    pub fn create_library(config: &Config) -> Result<Arc<BookmarkLibrary>> {
        let storage = storage::BackendLocal::new(config.cache_dir())
            .context("Failed to create cache directory")?;
        let cache = CacheStore::new(Arc::new(storage));

        Ok(Arc::new(BookmarkLibrary::new(cache, Self::create_source(config))))
    }

    pub async fn create_preview_cache(config: &Config) -> Result<PreviewCache> {
        let store = DiskPreviewStore::open(config.previews_dir())
            .await
            .context("Failed to open preview store")?;
        Ok(PreviewCache::new(Arc::new(store), config.preview.max_cache_items))
    }

    pub async fn create_preview_service(
        config: &Config,
        capture: Arc<dyn ViewportCapture>,
    ) -> Result<PreviewService> {
        let cache = Self::create_preview_cache(config).await?;
        let queue = CaptureQueue::spawn(capture, config.preview.capture_timeout());

        Ok(PreviewService::new(queue, cache))
    }
}
