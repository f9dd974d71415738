use serde::{Deserialize, Serialize};

pub mod indexer;
pub mod search;
pub mod source;
pub mod urls;

pub use indexer::{build_index, BuiltIndex};
pub use search::search;
pub use source::BookmarkSource;

/// A node as handed over by a bookmark data source.
///
/// `url` marks a leaf, `children` (even empty) marks a folder; a node with
/// neither is ignored by the indexer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkTreeNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkTreeNode>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    pub folder_path: String,
    pub child_folder_ids: Vec<String>,
    pub child_bookmark_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkIndexItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    pub url: String,
    pub folder_path: String,
    pub domain: String,
    /// Normalized `title domain url folder_path`, the only field search scans.
    pub search_text: String,
}

/// Lowercase, collapse whitespace runs into one space, trim.
///
/// Shared by item indexing and query parsing so both sides compare equal.
pub fn normalize_search_text(value: &str) -> String {
    value
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_search_text() {
        assert_eq!(normalize_search_text("  Hello \t  World\n"), "hello world");
        assert_eq!(normalize_search_text("GitHub"), "github");
        assert_eq!(normalize_search_text("   "), "");
        assert_eq!(normalize_search_text(""), "");
    }

    #[test]
    fn test_tree_node_json_shape() {
        let node: BookmarkTreeNode = serde_json::from_str(
            r#"{"id":"1","parentId":"0","title":"Bar","children":[{"id":"10","url":"https://a.dev/"}]}"#,
        )
        .unwrap();

        assert_eq!(node.parent_id.as_deref(), Some("0"));
        let children = node.children.unwrap();
        assert_eq!(children[0].url.as_deref(), Some("https://a.dev/"));
        assert!(children[0].children.is_none());
    }
}
