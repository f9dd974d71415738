//! Crop, scale and encode steps of preview generation.
//!
//! Takes a raw viewport capture, cuts out the element's box (in device
//! pixels), scales it down to a maximum width and encodes it once.

use std::io::Cursor;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_WIDTH: u32 = 640;
pub const MIN_MAX_WIDTH: u32 = 240;
pub const MAX_MAX_WIDTH: u32 = 1200;

pub const DEFAULT_QUALITY: f32 = 0.82;
pub const MIN_QUALITY: f32 = 0.3;
pub const MAX_QUALITY: f32 = 0.95;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFormat {
    /// Lossy WebP, smallest output
    #[default]
    Webp,
    /// Lossy JPEG
    Jpeg,
    /// Lossless PNG, quality is ignored
    Png,
}

impl PreviewFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            PreviewFormat::Webp => "image/webp",
            PreviewFormat::Jpeg => "image/jpeg",
            PreviewFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            PreviewFormat::Webp => "webp",
            PreviewFormat::Jpeg => "jpg",
            PreviewFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: PreviewFormat,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), STANDARD.encode(&self.bytes))
    }
}

/// Element bounding box in CSS pixels, relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Finite and strictly positive width and height.
    pub fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Region of the raw capture, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn clamp_max_width(max_width: Option<u32>) -> u32 {
    max_width
        .map(|w| w.clamp(MIN_MAX_WIDTH, MAX_MAX_WIDTH))
        .unwrap_or(DEFAULT_MAX_WIDTH)
}

pub fn clamp_quality(quality: Option<f32>) -> f32 {
    match quality {
        Some(q) if q.is_finite() => q.clamp(MIN_QUALITY, MAX_QUALITY),
        _ => DEFAULT_QUALITY,
    }
}

/// Anything but a finite positive ratio counts as 1.
pub fn sanitize_dpr(dpr: f64) -> f64 {
    if dpr.is_finite() && dpr > 0.0 {
        dpr
    } else {
        1.0
    }
}

/// Maps the element box onto the capture, clipped to the image bounds.
/// `None` when nothing of the element is inside the capture.
pub fn crop_rect(rect: &Rect, dpr: f64, image_width: u32, image_height: u32) -> Option<CropRect> {
    let dpr = sanitize_dpr(dpr);

    let sx = (rect.left * dpr).max(0.0);
    let sy = (rect.top * dpr).max(0.0);
    let sw = (image_width as f64 - sx).min(rect.width * dpr);
    let sh = (image_height as f64 - sy).min(rect.height * dpr);

    if !(sw > 0.0 && sh > 0.0) {
        return None;
    }

    let x = sx.round() as u32;
    let y = sy.round() as u32;
    let width = (sw.round() as u32).min(image_width.saturating_sub(x));
    let height = (sh.round() as u32).min(image_height.saturating_sub(y));

    if width == 0 || height == 0 {
        return None;
    }

    Some(CropRect { x, y, width, height })
}

/// Output size for a crop of `width` x `height`, never wider than `max_width`.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let scale = if width > max_width {
        max_width as f64 / width as f64
    } else {
        1.0
    };

    let target_w = ((width as f64) * scale).round() as u32;
    let target_h = ((height as f64) * scale).round() as u32;
    (target_w.max(1), target_h.max(1))
}

pub fn decode(raw: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(raw).context("Failed to decode capture")
}

pub fn crop_and_scale(img: &DynamicImage, crop: CropRect, max_width: u32) -> DynamicImage {
    let cropped = img.crop_imm(crop.x, crop.y, crop.width, crop.height);
    let (target_w, target_h) = scaled_dimensions(crop.width, crop.height, max_width);

    if (target_w, target_h) == cropped.dimensions() {
        cropped
    } else {
        cropped.resize_exact(target_w, target_h, image::imageops::FilterType::Lanczos3)
    }
}

/// Encodes once; `quality` is in [0, 1] and ignored for PNG.
pub fn encode(img: &DynamicImage, format: PreviewFormat, quality: f32) -> Result<EncodedImage> {
    let bytes = match format {
        PreviewFormat::Webp => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            let encoder = webp::Encoder::from_rgba(&rgba, width, height);
            encoder.encode(quality * 100.0).to_vec()
        }
        PreviewFormat::Jpeg => {
            let mut buf = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut buf, (quality * 100.0).round() as u8);
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .context("Failed to encode jpeg")?;
            buf
        }
        PreviewFormat::Png => {
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .context("Failed to encode png")?;
            buf
        }
    };

    Ok(EncodedImage { format, bytes })
}
