use crate::UrlError;
use url::Url;

/// Reference prefixes that never name a fetchable resource
const INLINE_SCHEMES: &[&str] = &["data:", "javascript:", "mailto:", "tel:", "about:", "blob:"];

/// Cleans a raw reference as it appears in markup, stylesheets or manifests
///
/// Whitespace is trimmed and backslashes become forward slashes (authoring
/// tools on Windows routinely emit `images\bg.png`). Returns `None` for
/// references that are never fetched: empty strings, fragment-only anchors
/// and inline schemes such as `data:` URIs.
///
/// # Examples
///
/// ```
/// use asset_mirror::url::clean_reference;
///
/// assert_eq!(clean_reference("  img\\hero.png "), Some("img/hero.png".to_string()));
/// assert_eq!(clean_reference("data:image/png;base64,AAAA"), None);
/// assert_eq!(clean_reference(""), None);
/// ```
pub fn clean_reference(raw: &str) -> Option<String> {
    let cleaned = raw.trim().replace('\\', "/");

    if cleaned.is_empty() || cleaned.starts_with('#') {
        return None;
    }

    let lowered = cleaned.to_ascii_lowercase();
    if INLINE_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    Some(cleaned)
}

/// Resolves a raw reference against the URL of the document containing it
///
/// # Normalization Steps
///
/// 1. Clean the reference (see [`clean_reference`])
/// 2. Resolve it against `base` (absolute, protocol-relative, root-relative
///    and relative forms are all accepted)
/// 3. Reject anything that is not `http`/`https` or has no host
/// 4. Drop the fragment, keeping scheme, host, path and query
///
/// # Examples
///
/// ```
/// use url::Url;
/// use asset_mirror::url::normalize_reference;
///
/// let base = Url::parse("https://example.com/games/foo/").unwrap();
/// let url = normalize_reference("css/main.css#top", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/games/foo/css/main.css");
/// ```
pub fn normalize_reference(raw: &str, base: &Url) -> Result<Url, UrlError> {
    let cleaned = clean_reference(raw).ok_or_else(|| UrlError::Parse(raw.to_string()))?;

    let mut url = base
        .join(&cleaned)
        .map_err(|e| UrlError::Parse(format!("{}: {}", cleaned, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    Ok(url)
}
