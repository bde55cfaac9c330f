//! Directory listings derived from HTML index pages.
//!
//! The transport fetches a directory URL and hands the body to a
//! [`ListingParser`]. [`HtmlFileListParser`] understands the index pages
//! produced by common web servers and repository managers.

use std::collections::HashSet;
use std::io::Read;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};
use url::Url;

use crate::error::TransferError;

/// Turns a fetched directory index into entry names.
pub trait ListingParser: Send + Sync {
    /// Parses the index page at `base_url` into relative entry names.
    ///
    /// Directories keep their trailing `/`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::TransferFailed`] when the body cannot be read
    /// or `base_url` is not a usable URL.
    fn parse_file_list(
        &self,
        base_url: &str,
        body: &mut dyn Read,
    ) -> Result<Vec<String>, TransferError>;
}

#[allow(clippy::expect_used)]
static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("anchor pattern is valid")
});

/// Default parser for HTML directory indexes.
///
/// Only direct children of the base URL are returned, in document order and
/// without duplicates. Parent links, sort links (`?C=N;O=D`), fragments and
/// links to other hosts are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFileListParser;

impl ListingParser for HtmlFileListParser {
    fn parse_file_list(
        &self,
        base_url: &str,
        body: &mut dyn Read,
    ) -> Result<Vec<String>, TransferError> {
        let base = Url::parse(base_url).map_err(|e| {
            TransferError::transfer_failed_with(format!("Unable to parse as URL: {base_url}"), e)
        })?;

        let mut raw = Vec::new();
        body.read_to_end(&mut raw).map_err(|e| {
            TransferError::transfer_failed_with(format!("Unable to read listing of {base_url}"), e)
        })?;
        let html = String::from_utf8_lossy(&raw);

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for captures in ANCHOR_HREF.captures_iter(&html) {
            let Some(href) = captures
                .get(1)
                .or_else(|| captures.get(2))
                .or_else(|| captures.get(3))
            else {
                continue;
            };
            let Some(entry) = clean_link(&base, href.as_str()) else {
                trace!(href = href.as_str(), "skipping listing link");
                continue;
            };
            if seen.insert(entry.clone()) {
                entries.push(entry);
            }
        }

        debug!(url = %base_url, entries = entries.len(), "parsed directory listing");
        Ok(entries)
    }
}

/// Resolves `href` against `base` and returns it relative to `base`, or
/// `None` when the link is not a direct child entry.
fn clean_link(base: &Url, href: &str) -> Option<String> {
    let href = unescape_entities(href.trim());
    if href.is_empty() || href.starts_with('?') || href.starts_with('#') || href.contains('?') {
        return None;
    }

    let resolved = base.join(&href).ok()?;
    if resolved.scheme() != base.scheme()
        || resolved.host_str() != base.host_str()
        || resolved.port_or_known_default() != base.port_or_known_default()
    {
        return None;
    }

    let relative = resolved.path().strip_prefix(base.path())?;
    let decoded = urlencoding::decode(relative)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| relative.to_string());

    if decoded.is_empty() || decoded == "./" || decoded.starts_with("../") {
        return None;
    }
    // Only direct children: a `/` may appear solely as the directory marker.
    if decoded.trim_end_matches('/').contains('/') {
        return None;
    }
    Some(decoded)
}

fn unescape_entities(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
