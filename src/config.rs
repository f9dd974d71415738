use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::{
    images::{self, PreviewFormat},
    preview::{store::DEFAULT_MAX_CACHE_ITEMS, PreviewOptions},
};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_ENTRY_FOLDER_ID: &str = "1";
const MIN_CARDS_PER_ROW: u8 = 5;
const MAX_CARDS_PER_ROW: u8 = 9;

const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_VIEWPORT_WIDTH: u32 = 1366;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

/// Falls back to `T::default()` for values that don't parse, so one bad
/// setting never rejects the whole file.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_yml::Value::deserialize(deserializer)?;
    Ok(serde_yml::from_value(value).unwrap_or_default())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenBehavior {
    #[default]
    CurrentTab,
    NewTab,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Folder shown on start; the root folder when it no longer exists.
    #[serde(default = "default_entry_folder_id")]
    pub entry_folder_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub theme_mode: ThemeMode,
    #[serde(default, deserialize_with = "lenient")]
    pub open_behavior: OpenBehavior,
    /// 5 to 9
    #[serde(default = "default_cards_per_row", deserialize_with = "lenient_cards_per_row")]
    pub cards_per_row: u8,
    /// Site previews visit the bookmarked page, so they are opt-in.
    #[serde(default)]
    pub enable_site_previews: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            entry_folder_id: default_entry_folder_id(),
            theme_mode: ThemeMode::default(),
            open_behavior: OpenBehavior::default(),
            cards_per_row: default_cards_per_row(),
            enable_site_previews: false,
        }
    }
}

fn default_entry_folder_id() -> String {
    DEFAULT_ENTRY_FOLDER_ID.to_string()
}

fn default_cards_per_row() -> u8 {
    MIN_CARDS_PER_ROW
}

fn lenient_cards_per_row<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = serde_yml::Value::deserialize(deserializer)?;
    let cards = match value.as_f64() {
        Some(n) if n.is_finite() => n.round().clamp(0.0, u8::MAX as f64) as u8,
        _ => default_cards_per_row(),
    };
    Ok(cards)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default, deserialize_with = "lenient")]
    pub format: PreviewFormat,
    /// 0 disables eviction.
    #[serde(default = "default_max_cache_items")]
    pub max_cache_items: usize,
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            quality: default_quality(),
            format: PreviewFormat::default(),
            max_cache_items: default_max_cache_items(),
            capture_timeout_ms: default_capture_timeout_ms(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

fn default_max_width() -> u32 {
    images::DEFAULT_MAX_WIDTH
}

fn default_quality() -> f32 {
    images::DEFAULT_QUALITY
}

fn default_max_cache_items() -> usize {
    DEFAULT_MAX_CACHE_ITEMS
}

fn default_capture_timeout_ms() -> u64 {
    DEFAULT_CAPTURE_TIMEOUT_MS
}

fn default_viewport_width() -> u32 {
    DEFAULT_VIEWPORT_WIDTH
}

fn default_viewport_height() -> u32 {
    DEFAULT_VIEWPORT_HEIGHT
}

impl PreviewConfig {
    pub fn options(&self) -> PreviewOptions {
        PreviewOptions {
            max_width: Some(self.max_width),
            format: self.format,
            quality: Some(self.quality),
        }
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bookmark tree to read. Without it the default Chromium profile is
    /// tried, then the built-in sample.
    #[serde(default)]
    pub bookmarks_file: Option<String>,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub settings: UserSettings,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&mut self) {
        let settings = &mut self.settings;
        settings.entry_folder_id = settings.entry_folder_id.trim().to_string();
        if settings.entry_folder_id.is_empty() {
            settings.entry_folder_id = default_entry_folder_id();
        }
        settings.cards_per_row = settings.cards_per_row.clamp(MIN_CARDS_PER_ROW, MAX_CARDS_PER_ROW);

        let preview = &mut self.preview;
        preview.max_width = images::clamp_max_width(Some(preview.max_width));
        preview.quality = images::clamp_quality(Some(preview.quality));
        if preview.capture_timeout_ms == 0 {
            preview.capture_timeout_ms = default_capture_timeout_ms();
        }
        if preview.viewport_width == 0 {
            preview.viewport_width = default_viewport_width();
        }
        if preview.viewport_height == 0 {
            preview.viewport_height = default_viewport_height();
        }
    }

    /// Reads `config.yaml` under `base_path`, creating it with defaults when
    /// missing.
    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref();
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&path, config_str).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Fails unless the user opted in to site previews.
    pub fn ensure_previews_enabled(&self) -> anyhow::Result<()> {
        if !self.settings.enable_site_previews {
            anyhow::bail!(
                "site previews are off, set settings.enable_site_previews in {}",
                self.base_path.join(CONFIG_FILE).display()
            );
        }
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base_path.join("cache")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.base_path.join("previews")
    }
}
