//! URL handling module for Asset-Mirror
//!
//! This module provides reference normalization, same-origin scope
//! classification, and the mapping from resource URLs to paths inside a
//! mirror directory.

mod layout;
mod normalize;
mod scope;

pub use layout::{destination_path, manifest_url, mirror_directory};
pub use normalize::{clean_reference, normalize_reference};
pub use scope::{is_in_scope, ScopeClassifier};

use url::Url;

/// Returns the origin authority of a URL: lowercase host plus an explicit
/// port when the URL carries a non-default one.
///
/// Two URLs belong to the same mirror scope exactly when their origin
/// authorities are equal.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use asset_mirror::url::origin_of;
///
/// let url = Url::parse("https://Games.Example.com/play/").unwrap();
/// assert_eq!(origin_of(&url), Some("games.example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(origin_of(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
