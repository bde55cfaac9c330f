//! Resource URL composition.
//!
//! URLs are built by plain concatenation. Nothing is normalized or
//! percent-encoded here; callers pass already-encoded path segments.

/// Joins a repository base URL and a relative resource path.
///
/// A `/` is inserted only when `base_url` does not already end with one.
///
/// # Example
///
/// ```
/// use artifact_transport::build_url;
///
/// assert_eq!(build_url("http://host/repo", "a/b.jar"), "http://host/repo/a/b.jar");
/// assert_eq!(build_url("http://host/repo/", "a/b.jar"), "http://host/repo/a/b.jar");
/// ```
#[must_use]
pub fn build_url(base_url: &str, relative_path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{relative_path}")
    } else {
        format!("{base_url}/{relative_path}")
    }
}

/// Returns `path` with a trailing `/`, as required for directory listings.
#[must_use]
pub fn directory_path(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}
