use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

const DEFAULT_FAVICON_SIZE: u32 = 64;
const MIN_FAVICON_SIZE: u32 = 16;
const MAX_FAVICON_SIZE: u32 = 256;

/// Everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, like `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Hostname of `url`, or an empty string when it does not parse.
pub fn domain_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_default()
}

fn favicon_size(size: Option<u32>) -> u32 {
    size.unwrap_or(DEFAULT_FAVICON_SIZE)
        .clamp(MIN_FAVICON_SIZE, MAX_FAVICON_SIZE)
}

/// Browser-internal favicon endpoint for a page.
///
/// `favicon2` takes the page as `page_url`, not `url`.
pub fn favicon_url(page_url: &str, size: Option<u32>) -> String {
    let size = favicon_size(size);
    let encoded = utf8_percent_encode(page_url, URI_COMPONENT);
    format!(
        "chrome://favicon2/?size={size}&scale_factor=2x&show_fallback_monogram=1&page_url={encoded}"
    )
}

/// Favicon candidates in the order a renderer should try them.
pub fn favicon_fallback_urls(page_url: &str, size: Option<u32>) -> Vec<String> {
    let raw_url = page_url.trim();
    if raw_url.is_empty() {
        return vec![];
    }

    let size = favicon_size(size);
    let mut urls = vec![
        favicon_url(raw_url, Some(size)),
        format!("chrome://favicon/size/{size}@2x/{raw_url}"),
        format!("chrome://favicon/{raw_url}"),
    ];

    if let Ok(parsed) = Url::parse(raw_url) {
        let origin = parsed.origin();
        if origin.is_tuple() {
            urls.push(format!("{}/favicon.ico", origin.ascii_serialization()));
        }
    }

    urls
}
