//! Tree → index transformation.
//!
//! One depth-first pass over the source tree produces the folder collection
//! (addressed by id) and the flat, searchable item list. Both collections
//! are owned by [`IndexArena`] and passed down explicitly; nothing is
//! captured by closures and the input tree is never mutated.

use std::collections::HashMap;

use super::{normalize_search_text, urls::domain_from_url, BookmarkIndexItem, BookmarkTreeNode, FolderNode};

/// Title given to a root folder whose own title is blank.
pub const ROOT_FOLDER_TITLE: &str = "Root";
/// Title given to any other folder whose title is blank.
pub const UNTITLED_FOLDER_TITLE: &str = "Untitled folder";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltIndex {
    pub folder_nodes: Vec<FolderNode>,
    pub bookmark_items: Vec<BookmarkIndexItem>,
}

impl BuiltIndex {
    /// An index without a single folder almost always means the source read failed.
    pub fn is_empty(&self) -> bool {
        self.folder_nodes.is_empty()
    }
}

#[derive(Default)]
struct IndexArena {
    folders: Vec<FolderNode>,
    positions: HashMap<String, usize>,
    items: Vec<BookmarkIndexItem>,
}

impl IndexArena {
    /// Registers a folder and returns its slot, or `None` when the id is
    /// already present (the source repeated a folder).
    fn open_folder(
        &mut self,
        node: &BookmarkTreeNode,
        parent_id: Option<String>,
        parent_path: &str,
        is_root: bool,
    ) -> Option<usize> {
        if self.positions.contains_key(&node.id) {
            log::warn!("folder {} appears twice in the bookmark tree, skipping", node.id);
            return None;
        }

        let title = folder_title(node, is_root);
        let folder_path = if is_root {
            String::new()
        } else {
            join_folder_path(parent_path, &title)
        };

        let slot = self.folders.len();
        self.positions.insert(node.id.clone(), slot);
        self.folders.push(FolderNode {
            id: node.id.clone(),
            parent_id,
            title,
            folder_path,
            child_folder_ids: vec![],
            child_bookmark_ids: vec![],
        });

        Some(slot)
    }

    fn push_item(&mut self, folder_slot: usize, node: &BookmarkTreeNode, url: &str) {
        let folder = &mut self.folders[folder_slot];

        let title = match node.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => url.to_string(),
        };
        let domain = domain_from_url(url);
        let folder_path = folder.folder_path.clone();
        let search_text = normalize_search_text(&format!("{title} {domain} {url} {folder_path}"));

        folder.child_bookmark_ids.push(node.id.clone());
        self.items.push(BookmarkIndexItem {
            id: node.id.clone(),
            parent_id: node.parent_id.clone().or_else(|| Some(folder.id.clone())),
            title,
            url: url.to_string(),
            folder_path,
            domain,
            search_text,
        });
    }

    fn finish(self) -> BuiltIndex {
        BuiltIndex {
            folder_nodes: self.folders,
            bookmark_items: self.items,
        }
    }
}

fn folder_title(node: &BookmarkTreeNode, is_root: bool) -> String {
    let title = node.title.as_deref().unwrap_or_default().trim();
    match (title.is_empty(), is_root) {
        (false, _) => title.to_string(),
        (true, true) => ROOT_FOLDER_TITLE.to_string(),
        (true, false) => UNTITLED_FOLDER_TITLE.to_string(),
    }
}

fn join_folder_path(parent_path: &str, title: &str) -> String {
    if parent_path.is_empty() {
        title.to_string()
    } else {
        format!("{parent_path}/{title}")
    }
}

/// Builds the folder map and flat item list from the given roots.
///
/// Every root gets `folder_path == ""` so its title never prefixes the paths
/// below it. Child order is preserved: it is the user's manual ordering.
pub fn build_index(roots: &[BookmarkTreeNode]) -> BuiltIndex {
    let mut arena = IndexArena::default();

    for root in roots {
        let Some(children) = root.children.as_deref() else {
            continue;
        };
        let Some(root_slot) = arena.open_folder(root, None, "", true) else {
            continue;
        };

        // explicit stack: deep trees must not overflow the call stack
        let mut stack = vec![(root_slot, children.iter())];
        loop {
            let (slot, next) = match stack.last_mut() {
                Some((slot, children)) => (*slot, children.next()),
                None => break,
            };

            let Some(child) = next else {
                stack.pop();
                continue;
            };

            if let Some(url) = child.url.as_deref() {
                arena.push_item(slot, child, url);
                continue;
            }

            if let Some(grandchildren) = child.children.as_deref() {
                let parent = &arena.folders[slot];
                let parent_path = parent.folder_path.clone();
                let parent_id = child.parent_id.clone().or_else(|| Some(parent.id.clone()));

                // a repeated folder stays listed under its first parent only
                if let Some(child_slot) = arena.open_folder(child, parent_id, &parent_path, false) {
                    arena.folders[slot].child_folder_ids.push(child.id.clone());
                    stack.push((child_slot, grandchildren.iter()));
                }
            }
        }
    }

    let built = arena.finish();
    if built.is_empty() {
        log::error!("bookmark tree is empty or could not be parsed");
    }

    built
}
