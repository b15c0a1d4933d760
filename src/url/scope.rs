use crate::url::{normalize_reference, origin_of};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// Checks whether a raw reference names a resource inside the mirror scope
///
/// A reference is in scope when, after resolution against `document`, it is
/// an `http`/`https` URL whose origin authority equals `origin`. Empty
/// strings, `data:` URIs and other inline schemes are never in scope.
///
/// # Arguments
///
/// * `candidate` - The raw reference as found in the document
/// * `document` - URL of the document the reference was found in
/// * `origin` - Origin authority of the entry document (see [`origin_of`])
///
/// # Examples
///
/// ```
/// use url::Url;
/// use asset_mirror::url::is_in_scope;
///
/// let page = Url::parse("https://games.example.com/foo/").unwrap();
/// assert!(is_in_scope("img/a.png", &page, "games.example.com"));
/// assert!(is_in_scope("//games.example.com/b.png", &page, "games.example.com"));
/// assert!(!is_in_scope("https://cdn.other.net/c.png", &page, "games.example.com"));
/// assert!(!is_in_scope("data:image/png;base64,AA", &page, "games.example.com"));
/// ```
pub fn is_in_scope(candidate: &str, document: &Url, origin: &str) -> bool {
    resolve_in_scope(candidate, document, origin).is_some()
}

fn resolve_in_scope(candidate: &str, document: &Url, origin: &str) -> Option<Url> {
    let url = normalize_reference(candidate, document).ok()?;
    if origin_of(&url).as_deref() == Some(origin) {
        Some(url)
    } else {
        None
    }
}

/// Memoizing scope classifier bound to one crawl's origin
///
/// The same references show up again and again across a page, its inline
/// styles and its stylesheets, so resolutions are cached per
/// `(document, candidate)` pair. Safe to share between workers.
#[derive(Debug)]
pub struct ScopeClassifier {
    origin: String,
    cache: Mutex<HashMap<(String, String), Option<Url>>>,
}

impl ScopeClassifier {
    /// Creates a classifier for the origin of `entry`
    ///
    /// Returns `None` when the entry URL has no host.
    pub fn for_entry(entry: &Url) -> Option<Self> {
        origin_of(entry).map(Self::new)
    }

    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The origin authority this classifier accepts
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Resolves `candidate` against `document` and returns the absolute URL
    /// when it lies inside the scope
    pub fn classify(&self, candidate: &str, document: &Url) -> Option<Url> {
        let key = (document.as_str().to_string(), candidate.to_string());

        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let resolved = resolve_in_scope(candidate, document, &self.origin);
        if resolved.is_none() {
            tracing::trace!(
                candidate,
                document = %document,
                phase = "classification",
                "reference out of scope"
            );
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, resolved.clone());
        }

        resolved
    }

    /// Checks an already absolute URL against the scope
    pub fn accepts(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && origin_of(url).as_deref() == Some(self.origin.as_str())
    }

    /// Number of memoized resolutions
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}
