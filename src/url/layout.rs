//! Mapping from resource URLs to files inside a mirror directory

use crate::UrlError;
use std::path::{Path, PathBuf};
use url::Url;

/// Computes where a resource is stored inside the mirror directory
///
/// The entry document's directory (its path up to and including the last
/// `/`) is the mirror root. Resources below it keep their path relative to
/// it; resources elsewhere on the origin are stored under their full
/// server-side path. Paths naming a directory get `index_file` appended.
/// Query strings never influence the location.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use url::Url;
/// use asset_mirror::url::destination_path;
///
/// let entry = Url::parse("https://example.com/games/foo/").unwrap();
/// let dest = Path::new("/mirror");
///
/// let inside = Url::parse("https://example.com/games/foo/img/a.png").unwrap();
/// assert_eq!(
///     destination_path(&inside, &entry, dest, "index.html"),
///     Path::new("/mirror/img/a.png")
/// );
///
/// let outside = Url::parse("https://example.com/shared/lib.js").unwrap();
/// assert_eq!(
///     destination_path(&outside, &entry, dest, "index.html"),
///     Path::new("/mirror/shared/lib.js")
/// );
/// ```
pub fn destination_path(resource: &Url, entry: &Url, dest: &Path, index_file: &str) -> PathBuf {
    let resource_path = resource.path().trim_start_matches('/');
    let base = entry_directory(entry);

    let relative = match resource_path.strip_prefix(base.as_str()) {
        Some(rest) if !base.is_empty() => rest,
        _ => resource_path,
    };

    let mut path = dest.to_path_buf();
    for segment in relative.split('/') {
        // Url parsing already collapsed dot segments; this keeps hand-built
        // URLs from escaping the mirror as well
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        path.push(segment);
    }

    if relative.is_empty() || relative.ends_with('/') {
        path.push(index_file);
    }

    path
}

/// Directory of the entry document without the leading slash, ending in `/`
/// unless it is the server root
fn entry_directory(entry: &Url) -> String {
    let path = entry.path().trim_start_matches('/');
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => String::new(),
    }
}

/// Computes the mirror directory for an entry URL: `root/<host>/<name>`
///
/// `<name>` is the last non-empty path segment of the entry URL; pages
/// served from the server root mirror straight into `root/<host>`. A
/// non-default port becomes part of the host folder as `host_port`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use url::Url;
/// use asset_mirror::url::mirror_directory;
///
/// let entry = Url::parse("https://example.com/games/space_race/").unwrap();
/// assert_eq!(
///     mirror_directory(Path::new("downloaded_games"), &entry).unwrap(),
///     Path::new("downloaded_games/example.com/space_race")
/// );
/// ```
pub fn mirror_directory(root: &Path, entry: &Url) -> Result<PathBuf, UrlError> {
    let host = entry.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    let host_folder = match entry.port() {
        Some(port) => format!("{}_{}", host, port),
        None => host,
    };

    let mut dir = root.join(sanitize_folder_name(&host_folder));
    if let Some(name) = entry
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
    {
        dir.push(sanitize_folder_name(name));
    }

    Ok(dir)
}

/// Replaces characters that are invalid in folder names on common platforms
fn sanitize_folder_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect()
}

/// URL of the well-known manifest next to the entry document
pub fn manifest_url(entry: &Url, file_name: &str) -> Result<Url, UrlError> {
    entry
        .join(file_name)
        .map_err(|e| UrlError::Parse(format!("{}: {}", file_name, e)))
}
