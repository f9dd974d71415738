use std::fmt;

use async_trait::async_trait;

use super::{PreviewError, PreviewOptions};
use crate::images::{self, EncodedImage, Rect};

/// The screen-capture primitive. Only one capture may run at a time, the
/// queue in [`super::queue`] takes care of that.
#[async_trait]
pub trait ViewportCapture: Send + Sync {
    /// Raw image of the visible viewport, in device pixels.
    async fn capture_visible_viewport(&self) -> anyhow::Result<Vec<u8>>;

    async fn device_pixel_ratio(&self) -> f64;
}

/// The element to be cut out of the viewport capture.
#[async_trait]
pub trait CaptureTarget: Send + Sync {
    async fn is_attached(&self) -> bool;

    /// Bounding box in CSS pixels, `None` when it can't be measured.
    async fn bounding_rect(&self) -> Option<Rect>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Queued,
    Capturing,
    Decoding,
    Transforming,
    Encoding,
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            CaptureStage::Queued => "queued",
            CaptureStage::Capturing => "capturing",
            CaptureStage::Decoding => "decoding",
            CaptureStage::Transforming => "transforming",
            CaptureStage::Encoding => "encoding",
        };
        f.write_str(stage)
    }
}

/// Fails unless the target is attached and has a drawable box.
pub async fn check_target(target: &dyn CaptureTarget) -> Result<Rect, PreviewError> {
    if !target.is_attached().await {
        return Err(PreviewError::Detached);
    }

    let rect = target.bounding_rect().await.ok_or(PreviewError::Detached)?;
    if !rect.is_drawable() {
        return Err(PreviewError::InvalidRect(rect));
    }

    Ok(rect)
}

/// One full capture. Must only be called by the queue worker.
pub(crate) async fn run_capture(
    capture: &dyn ViewportCapture,
    target: &dyn CaptureTarget,
    options: PreviewOptions,
) -> Result<EncodedImage, PreviewError> {
    // the element may have gone away while the request was queued
    let rect = check_target(target).await?;
    let dpr = capture.device_pixel_ratio().await;

    let raw = capture
        .capture_visible_viewport()
        .await
        .map_err(PreviewError::Capture)?;

    tokio::task::spawn_blocking(move || transform(&raw, &rect, dpr, options)).await?
}

fn transform(
    raw: &[u8],
    rect: &Rect,
    dpr: f64,
    options: PreviewOptions,
) -> Result<EncodedImage, PreviewError> {
    let img = images::decode(raw).map_err(PreviewError::Decode)?;

    let crop = images::crop_rect(rect, dpr, img.width(), img.height()).ok_or(PreviewError::EmptyCrop)?;
    let scaled = images::crop_and_scale(&img, crop, images::clamp_max_width(options.max_width));

    images::encode(&scaled, options.format, images::clamp_quality(options.quality))
        .map_err(PreviewError::Encode)
}
