//! `link` header parsing.
//!
//! The header is a comma-separated list of `<url>; rel="name"` entries.
//! Traversal cursors live in the target url's query string.

use crate::error::{Error, Result};

/// Find the target url for relation `rel`.
pub fn target<'a>(header: &'a str, rel: &str) -> Option<&'a str> {
    let wanted = format!("rel=\"{rel}\"");
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let url = parts.next()?.trim();
        if !parts.any(|p| p.trim() == wanted) {
            return None;
        }
        url.strip_prefix('<')?.strip_suffix('>')
    })
}

/// Read an integer query parameter from a url.
pub fn query_param(url: &str, name: &str) -> Option<i64> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.parse().ok())
}

/// Extract the cursor `param` from the `rel` entry of a link header.
///
/// A missing relation or parameter is malformed pagination metadata.
pub fn cursor(header: &str, rel: &str, param: &str) -> Result<i64> {
    let url = target(header, rel)
        .ok_or_else(|| Error::Pagination(format!("no rel=\"{rel}\" entry in link header")))?;
    query_param(url, param)
        .ok_or_else(|| Error::Pagination(format!("rel=\"{rel}\" url {url} has no numeric {param}")))
}
