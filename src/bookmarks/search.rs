use std::cmp::Ordering;

use super::{normalize_search_text, BookmarkIndexItem};

pub const DEFAULT_SEARCH_LIMIT: usize = 120;
pub const MIN_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 500;

const SCORE_TITLE_PREFIX: u32 = 400;
const SCORE_TITLE: u32 = 300;
const SCORE_DOMAIN: u32 = 200;
const SCORE_URL: u32 = 100;
/// Matched only through the folder path; still a valid hit.
const SCORE_FOLDER_PATH: u32 = 0;

struct ScoredItem<'a> {
    item: &'a BookmarkIndexItem,
    score: u32,
    index: usize,
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .map(|limit| limit.clamp(MIN_SEARCH_LIMIT, MAX_SEARCH_LIMIT))
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
}

/// `keyword` must already be normalized.
pub fn match_score(item: &BookmarkIndexItem, keyword: &str) -> u32 {
    let title = item.title.to_lowercase();

    if title.starts_with(keyword) {
        SCORE_TITLE_PREFIX
    } else if title.contains(keyword) {
        SCORE_TITLE
    } else if item.domain.to_lowercase().contains(keyword) {
        SCORE_DOMAIN
    } else if item.url.to_lowercase().contains(keyword) {
        SCORE_URL
    } else {
        SCORE_FOLDER_PATH
    }
}

/// Ranks `items` against `raw_query`.
///
/// An empty query yields nothing rather than everything. Results are ordered
/// by score, highest first, and by position in `items` among equal scores.
pub fn search<'a>(
    items: &'a [BookmarkIndexItem],
    raw_query: &str,
    limit: Option<usize>,
) -> Vec<&'a BookmarkIndexItem> {
    let keyword = normalize_search_text(raw_query);
    if keyword.is_empty() {
        return vec![];
    }

    let limit = clamp_limit(limit);

    let mut matched: Vec<ScoredItem> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.search_text.contains(&keyword))
        .map(|(index, item)| ScoredItem {
            item,
            score: match_score(item, &keyword),
            index,
        })
        .collect();

    matched.sort_unstable_by(|a, b| match b.score.cmp(&a.score) {
        Ordering::Equal => a.index.cmp(&b.index),
        ord => ord,
    });

    matched.into_iter().take(limit).map(|scored| scored.item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str, url: &str, folder_path: &str) -> BookmarkIndexItem {
        let domain = crate::bookmarks::urls::domain_from_url(url);
        BookmarkIndexItem {
            id: id.to_string(),
            parent_id: None,
            title: title.to_string(),
            url: url.to_string(),
            folder_path: folder_path.to_string(),
            search_text: normalize_search_text(&format!("{title} {domain} {url} {folder_path}")),
            domain,
        }
    }

    fn ids(results: &[&BookmarkIndexItem]) -> Vec<String> {
        results.iter().map(|i| i.id.clone()).collect()
    }

    #[test]
    fn test_title_prefix_beats_title_contains() {
        let items = vec![
            item("notes", "My Git Notes", "https://example.com/git", ""),
            item("github", "GitHub", "https://github.com/", ""),
        ];

        let results = search(&items, "git", None);
        assert_eq!(ids(&results), vec!["github", "notes"]);
        assert_eq!(match_score(&items[1], "git"), 400);
        assert_eq!(match_score(&items[0], "git"), 300);
    }

    #[test]
    fn test_score_tiers() {
        let items = vec![
            item("path", "Alpha", "https://alpha.dev/", "Work/rustacean"),
            item("url", "Beta", "https://beta.dev/rust", ""),
            item("domain", "Gamma", "https://rust-lang.org/", ""),
            item("title", "Learn Rust", "https://learn.dev/", ""),
            item("prefix", "Rust Book", "https://book.dev/", ""),
        ];

        let results = search(&items, "RUST", None);
        assert_eq!(ids(&results), vec!["prefix", "title", "domain", "url", "path"]);
        assert_eq!(match_score(results[4], "rust"), 0);
    }

    #[test]
    fn test_ties_keep_source_order() {
        let items: Vec<_> = (0..30)
            .map(|i| item(&format!("{i}"), &format!("Docs {i}"), "https://docs.dev/", ""))
            .collect();

        let results = search(&items, "docs", None);
        let expected: Vec<String> = (0..30).map(|i| i.to_string()).collect();
        assert_eq!(ids(&results), expected);
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let items = vec![item("1", "Anything", "https://a.dev/", "")];
        assert!(search(&items, "", None).is_empty());
        assert!(search(&items, "   \t ", None).is_empty());
    }

    #[test]
    fn test_query_is_normalized() {
        let items = vec![item("1", "Rust   Programming Guide", "https://rust.dev/", "")];
        assert_eq!(search(&items, "  rust\tPROGRAMMING  ", None).len(), 1);
    }

    #[test]
    fn test_results_contain_query() {
        let items = vec![
            item("1", "Tokio tutorial", "https://tokio.rs/tokio/tutorial", "Rust/Async"),
            item("2", "Serde", "https://serde.rs/", "Rust"),
            item("3", "MDN", "https://developer.mozilla.org/", "Web"),
        ];

        for query in ["rust", "tutorial", "serde.rs", "web", "o"] {
            for result in search(&items, query, None) {
                assert!(result.search_text.contains(query), "{query}");
            }
        }
        // folder-path-only hits tie at 0 and keep source order
        assert_eq!(ids(&search(&items, "rust", None)), vec!["1", "2"]);
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(clamp_limit(None), 120);
        assert_eq!(clamp_limit(Some(0)), 10);
        assert_eq!(clamp_limit(Some(3)), 10);
        assert_eq!(clamp_limit(Some(250)), 250);
        assert_eq!(clamp_limit(Some(10_000)), 500);

        let items: Vec<_> = (0..600)
            .map(|i| item(&format!("{i}"), "Page", &format!("https://site.dev/{i}"), ""))
            .collect();

        assert_eq!(search(&items, "page", Some(1)).len(), 10);
        assert_eq!(search(&items, "page", None).len(), 120);
        assert_eq!(search(&items, "page", Some(999)).len(), 500);
    }
}
