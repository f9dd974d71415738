//! Headless Chrome as the capture primitive.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use headless_chrome::{
    protocol::cdp::{Page, Target::CreateTarget},
    Browser, LaunchOptionsBuilder, Tab,
};

use super::capture::{CaptureTarget, ViewportCapture};
use crate::images::Rect;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(10);

pub fn launch_browser() -> anyhow::Result<Browser> {
    let chrome_path = std::env::var("CHROME_PATH").unwrap_or("chromium".to_string());

    let options = LaunchOptionsBuilder::default()
        .path(Some(PathBuf::from(chrome_path)))
        .build()
        .map_err(|err| anyhow!("invalid chrome launch options: {err}"))?;

    Browser::new(options).context("failed to start chrome")
}

/// Opens `url` in a new tab of the given viewport size and waits for it to load.
pub fn open_page(browser: &Browser, url: &str, width: u32, height: u32) -> anyhow::Result<Arc<Tab>> {
    let tab = browser
        .new_tab_with_options(CreateTarget {
            url: "about:blank".to_string(),
            width: Some(width),
            height: Some(height),
            browser_context_id: None,
            enable_begin_frame_control: None,
            new_window: None,
            background: None,
            left: None,
            top: None,
            window_state: None,
            for_tab: None,
            hidden: None,
        })
        .context("failed to open tab")?;

    tab.set_default_timeout(NAVIGATION_TIMEOUT);
    tab.navigate_to(url)
        .with_context(|| format!("failed to navigate to {url}"))?;
    tab.wait_until_navigated()
        .with_context(|| format!("{url} did not finish loading"))?;

    Ok(tab)
}

pub struct HeadlessViewport {
    tab: Arc<Tab>,
}

impl HeadlessViewport {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }
}

#[async_trait]
impl ViewportCapture for HeadlessViewport {
    async fn capture_visible_viewport(&self) -> anyhow::Result<Vec<u8>> {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || {
            tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await?
    }

    async fn device_pixel_ratio(&self) -> f64 {
        let tab = self.tab.clone();
        let ratio = tokio::task::spawn_blocking(move || tab.evaluate("window.devicePixelRatio", false)).await;

        match ratio {
            Ok(Ok(object)) => object.value.and_then(|v| v.as_f64()).unwrap_or(1.0),
            Ok(Err(err)) => {
                log::debug!("devicePixelRatio unavailable: {err}");
                1.0
            }
            Err(err) => {
                log::debug!("devicePixelRatio unavailable: {err}");
                1.0
            }
        }
    }
}

/// The first element matching a CSS selector.
pub struct SelectorTarget {
    tab: Arc<Tab>,
    selector: String,
}

impl SelectorTarget {
    pub fn new(tab: Arc<Tab>, selector: impl Into<String>) -> Self {
        Self {
            tab,
            selector: selector.into(),
        }
    }
}

#[async_trait]
impl CaptureTarget for SelectorTarget {
    async fn is_attached(&self) -> bool {
        let tab = self.tab.clone();
        let selector = self.selector.clone();
        tokio::task::spawn_blocking(move || tab.find_element(&selector).is_ok())
            .await
            .unwrap_or(false)
    }

    async fn bounding_rect(&self) -> Option<Rect> {
        let tab = self.tab.clone();
        let selector = self.selector.clone();

        let model = tokio::task::spawn_blocking(move || {
            tab.find_element(&selector)
                .and_then(|element| element.get_box_model())
        })
        .await
        .ok()?;

        match model {
            Ok(model) => Some(Rect {
                left: model.border.top_left.x,
                top: model.border.top_left.y,
                width: model.width,
                height: model.height,
            }),
            Err(err) => {
                log::debug!("no box model for {}: {err}", self.selector);
                None
            }
        }
    }
}
