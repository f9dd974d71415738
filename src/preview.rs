//! Page previews: capture an element of a rendered page, cache the encoded
//! image per url and keep the cache bounded.

pub mod capture;
#[cfg(feature = "headless")]
pub mod headless;
pub mod queue;
pub mod store;

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::{
    cache::now_millis,
    images::{EncodedImage, PreviewFormat, Rect},
};

pub use capture::{CaptureStage, CaptureTarget, ViewportCapture};
pub use queue::CaptureQueue;
pub use store::{evict_oldest, EvictionReport, PreviewRecord, PreviewStore};

#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    #[error("capture target is detached")]
    Detached,
    #[error("capture target has no drawable area: {0:?}")]
    InvalidRect(Rect),
    #[error("element is outside of the captured viewport")]
    EmptyCrop,
    #[error("capture failed: {0}")]
    Capture(anyhow::Error),
    #[error("decode failed: {0}")]
    Decode(anyhow::Error),
    #[error("encode failed: {0}")]
    Encode(anyhow::Error),
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("capture queue is closed")]
    QueueClosed,
    #[error("join error: {0:?}")]
    Join(#[from] tokio::task::JoinError),
}

impl PreviewError {
    /// Stage the request was in when it failed.
    pub fn stage(&self) -> CaptureStage {
        match self {
            PreviewError::Detached | PreviewError::InvalidRect(_) | PreviewError::QueueClosed => {
                CaptureStage::Queued
            }
            PreviewError::Capture(_) | PreviewError::Timeout(_) => CaptureStage::Capturing,
            PreviewError::Decode(_) => CaptureStage::Decoding,
            PreviewError::EmptyCrop | PreviewError::Join(_) => CaptureStage::Transforming,
            PreviewError::Encode(_) => CaptureStage::Encoding,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreviewOptions {
    pub max_width: Option<u32>,
    pub format: PreviewFormat,
    pub quality: Option<f32>,
}

/// Bounded per-url preview cache.
#[derive(Clone)]
pub struct PreviewCache {
    store: Arc<dyn PreviewStore>,
    max_items: usize,
}

impl PreviewCache {
    /// `max_items == 0` disables eviction.
    pub fn new(store: Arc<dyn PreviewStore>, max_items: usize) -> Self {
        Self { store, max_items }
    }

    pub fn store(&self) -> &Arc<dyn PreviewStore> {
        &self.store
    }

    pub async fn get(&self, url: &str) -> Option<EncodedImage> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        match self.store.get(url).await {
            Ok(record) => record.map(|record| record.image),
            Err(err) => {
                log::error!("failed to read preview for {url}: {err}");
                None
            }
        }
    }

    /// Stores `image` for `url` and schedules eviction in the background.
    pub async fn set(&self, url: &str, image: EncodedImage) -> bool {
        self.set_with_eviction(url, image).await.is_some()
    }

    /// Like [`PreviewCache::set`], handing back the eviction task.
    pub(crate) async fn set_with_eviction(
        &self,
        url: &str,
        image: EncodedImage,
    ) -> Option<JoinHandle<EvictionReport>> {
        let url = url.trim();
        if url.is_empty() || image.bytes.is_empty() {
            return None;
        }

        let record = PreviewRecord {
            url: url.to_string(),
            updated_at: now_millis(),
            image,
        };

        if let Err(err) = self.store.put(record).await {
            log::error!("failed to store preview for {url}: {err}");
            return None;
        }

        Some(self.spawn_eviction())
    }

    fn spawn_eviction(&self) -> JoinHandle<EvictionReport> {
        let store = self.store.clone();
        let max_items = self.max_items;
        tokio::spawn(async move { evict_oldest(store.as_ref(), max_items).await })
    }
}

/// Capture queue in front of the preview cache.
#[derive(Clone)]
pub struct PreviewService {
    queue: CaptureQueue,
    cache: PreviewCache,
}

impl PreviewService {
    pub fn new(queue: CaptureQueue, cache: PreviewCache) -> Self {
        Self { queue, cache }
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    /// Captures `target` through the single-flight queue.
    pub async fn capture(
        &self,
        target: Arc<dyn CaptureTarget>,
        options: PreviewOptions,
    ) -> Option<EncodedImage> {
        match self.queue.submit(target, options).await {
            Ok(image) => Some(image),
            Err(err) => {
                log::warn!("preview capture failed while {}: {err}", err.stage());
                None
            }
        }
    }

    /// Captures `target` and caches the result under `url`.
    pub async fn capture_and_store(
        &self,
        url: &str,
        target: Arc<dyn CaptureTarget>,
        options: PreviewOptions,
    ) -> Option<EncodedImage> {
        let image = self.capture(target, options).await?;
        if !self.cache.set(url, image.clone()).await {
            log::warn!("captured preview for {url} could not be cached");
        }
        Some(image)
    }
}
