use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::BookmarkTreeNode;

/// Where the raw bookmark tree comes from.
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    async fn fetch_tree(&self) -> anyhow::Result<Vec<BookmarkTreeNode>>;
}

/// A JSON array of [`BookmarkTreeNode`] roots.
#[derive(Debug, Clone)]
pub struct JsonTreeSource {
    path: PathBuf,
}

impl JsonTreeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BookmarkSource for JsonTreeSource {
    async fn fetch_tree(&self) -> anyhow::Result<Vec<BookmarkTreeNode>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let roots = serde_json::from_slice(&data)
            .with_context(|| format!("{} is not a bookmark tree", self.path.display()))?;
        Ok(roots)
    }
}

#[derive(Debug, Deserialize)]
struct ChromeBookmarksFile {
    roots: ChromeRoots,
}

#[derive(Debug, Deserialize)]
struct ChromeRoots {
    bookmark_bar: Option<ChromeNode>,
    other: Option<ChromeNode>,
    synced: Option<ChromeNode>,
}

#[derive(Debug, Deserialize)]
struct ChromeNode {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    children: Option<Vec<ChromeNode>>,
}

impl ChromeNode {
    fn into_tree_node(self, parent_id: &str) -> BookmarkTreeNode {
        let id = self.id;
        let children = match self.kind.as_str() {
            "folder" => Some(
                self.children
                    .unwrap_or_default()
                    .into_iter()
                    .map(|child| child.into_tree_node(&id))
                    .collect(),
            ),
            _ => None,
        };

        BookmarkTreeNode {
            parent_id: Some(parent_id.to_string()),
            title: Some(self.name),
            url: if children.is_some() { None } else { self.url },
            children,
            id,
        }
    }
}

/// Id of the synthetic root, matching what the browser extension API returns.
pub const CHROME_ROOT_ID: &str = "0";

/// A Chromium profile `Bookmarks` file.
#[derive(Debug, Clone)]
pub struct ChromeProfileSource {
    path: PathBuf,
}

impl ChromeProfileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// First existing `Bookmarks` file among the usual Chromium profiles.
    pub fn discover() -> Option<Self> {
        let home = homedir::my_home().ok().flatten()?;
        ["google-chrome", "chromium", "BraveSoftware/Brave-Browser"]
            .iter()
            .map(|browser| home.join(".config").join(browser).join("Default/Bookmarks"))
            .find(|path| path.is_file())
            .map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(data: &[u8]) -> anyhow::Result<Vec<BookmarkTreeNode>> {
        let file: ChromeBookmarksFile =
            serde_json::from_slice(data).context("malformed Chromium bookmarks file")?;
        let ChromeRoots {
            bookmark_bar,
            other,
            synced,
        } = file.roots;

        let children = [bookmark_bar, other, synced]
            .into_iter()
            .flatten()
            .map(|node| node.into_tree_node(CHROME_ROOT_ID))
            .collect();

        Ok(vec![BookmarkTreeNode {
            id: CHROME_ROOT_ID.to_string(),
            parent_id: None,
            title: Some(String::new()),
            url: None,
            children: Some(children),
        }])
    }
}

#[async_trait]
impl BookmarkSource for ChromeProfileSource {
    async fn fetch_tree(&self) -> anyhow::Result<Vec<BookmarkTreeNode>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Self::parse(&data)
    }
}

/// Fixed dataset used when no real bookmark source is reachable.
#[derive(Debug, Clone, Default)]
pub struct SampleSource;

fn sample_folder(id: &str, parent_id: &str, title: &str, children: Vec<BookmarkTreeNode>) -> BookmarkTreeNode {
    BookmarkTreeNode {
        id: id.to_string(),
        parent_id: Some(parent_id.to_string()),
        title: Some(title.to_string()),
        url: None,
        children: Some(children),
    }
}

fn sample_link(id: &str, parent_id: &str, title: &str, url: &str) -> BookmarkTreeNode {
    BookmarkTreeNode {
        id: id.to_string(),
        parent_id: Some(parent_id.to_string()),
        title: Some(title.to_string()),
        url: Some(url.to_string()),
        children: None,
    }
}

impl SampleSource {
    pub fn tree() -> Vec<BookmarkTreeNode> {
        vec![BookmarkTreeNode {
            id: CHROME_ROOT_ID.to_string(),
            parent_id: None,
            title: Some(String::new()),
            url: None,
            children: Some(vec![
                sample_folder(
                    "1",
                    "0",
                    "Bookmarks bar",
                    vec![
                        sample_link("10", "1", "The Rust Book", "https://doc.rust-lang.org/book/"),
                        sample_link("11", "1", "Docs.rs", "https://docs.rs/"),
                        sample_folder(
                            "12",
                            "1",
                            "Toolbox",
                            vec![sample_link("120", "12", "GitHub", "https://github.com/")],
                        ),
                    ],
                ),
                sample_folder(
                    "2",
                    "0",
                    "Other bookmarks",
                    vec![sample_link(
                        "20",
                        "2",
                        "Chrome Extensions docs",
                        "https://developer.chrome.com/docs/extensions/",
                    )],
                ),
            ]),
        }]
    }
}

#[async_trait]
impl BookmarkSource for SampleSource {
    async fn fetch_tree(&self) -> anyhow::Result<Vec<BookmarkTreeNode>> {
        Ok(Self::tree())
    }
}
