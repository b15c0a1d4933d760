//! Resource extraction from fetched documents
//!
//! Three document kinds are scanned for references to fetchable resources:
//! - HTML: resource-bearing element attributes, `<style>` blocks, `style=`
//!   attributes and string literals ending in `.js` inside inline scripts
//! - CSS: `url(...)` functions and `@import` rules
//! - JSON manifests: string values that start with a known asset folder
//!
//! Every candidate goes through the scope classifier; out-of-scope and
//! malformed references are dropped silently.

use crate::url::{clean_reference, ScopeClassifier};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Element/attribute pairs that reference external resources
const RESOURCE_ATTRIBUTES: &[(&str, &str)] = &[
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("img[src]", "src"),
    ("video[src]", "src"),
    ("video[poster]", "poster"),
    ("audio[src]", "src"),
    ("source[src]", "src"),
    ("embed[src]", "src"),
    ("track[src]", "src"),
    ("input[type='image'][src]", "src"),
];

/// Elements whose `srcset` lists additional image candidates
const SRCSET_SELECTOR: &str = "img[srcset], source[srcset]";

fn css_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"']*))\s*\)"#)
            .expect("CSS url() pattern is valid")
    })
}

fn css_import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)@import\s+(?:"([^"]+)"|'([^']+)')"#)
            .expect("CSS @import pattern is valid")
    })
}

fn script_literal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"['"]([^'"]+?\.js(?:\?[^'"]*)?)['"]"#)
            .expect("script literal pattern is valid")
    })
}

/// Extracts every in-scope resource referenced by an HTML document
///
/// # Sources
///
/// - `href`/`src`/`poster` attributes of `link`, `script`, `img`, `video`,
///   `audio`, `source`, `embed`, `track` and image inputs
/// - `srcset` candidates on `img` and `source`
/// - `url(...)` references inside `<style>` blocks and `style=` attributes
/// - quoted string literals ending in `.js` inside inline `<script>` bodies
///
/// The script scan is a pattern match, not a parser: false positives are
/// expected and simply fail later as non-fatal fetch errors.
///
/// # Example
///
/// ```
/// use url::Url;
/// use asset_mirror::url::ScopeClassifier;
/// use asset_mirror::crawler::extract_html_resources;
///
/// let page = Url::parse("https://example.com/game/").unwrap();
/// let scope = ScopeClassifier::for_entry(&page).unwrap();
/// let html = r#"<link rel="stylesheet" href="css/a.css"><img src="https://cdn.net/x.png">"#;
///
/// let found = extract_html_resources(html, &page, &scope);
/// assert_eq!(found.len(), 1);
/// ```
pub fn extract_html_resources(html: &str, base_url: &Url, scope: &ScopeClassifier) -> HashSet<Url> {
    let document = Html::parse_document(html);
    let mut resources = HashSet::new();

    for (selector, attribute) in RESOURCE_ATTRIBUTES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(value) = element.value().attr(attribute) {
                insert_candidate(&mut resources, value, base_url, scope);
            }
        }
    }

    if let Ok(selector) = Selector::parse(SRCSET_SELECTOR) {
        for element in document.select(&selector) {
            if let Some(srcset) = element.value().attr("srcset") {
                for candidate in parse_srcset(srcset) {
                    insert_candidate(&mut resources, candidate, base_url, scope);
                }
            }
        }
    }

    // Inline <style> blocks
    if let Ok(selector) = Selector::parse("style") {
        for element in document.select(&selector) {
            let css = element.text().collect::<String>();
            resources.extend(extract_css_resources(&css, base_url, scope));
        }
    }

    // style="..." attributes
    if let Ok(selector) = Selector::parse("[style]") {
        for element in document.select(&selector) {
            if let Some(style) = element.value().attr("style") {
                resources.extend(extract_css_resources(style, base_url, scope));
            }
        }
    }

    // Inline scripts only; external ones were collected above
    if let Ok(selector) = Selector::parse("script:not([src])") {
        for element in document.select(&selector) {
            let body = element.text().collect::<String>();
            for literal in script_literal_pattern().captures_iter(&body) {
                if let Some(m) = literal.get(1) {
                    insert_candidate(&mut resources, m.as_str(), base_url, scope);
                }
            }
        }
    }

    tracing::debug!(
        document = %base_url,
        count = resources.len(),
        "extracted resources from HTML"
    );

    resources
}

/// Extracts every in-scope resource referenced by a stylesheet
///
/// Matches `url(...)` with double, single or no quotes plus `@import` rules
/// given as bare strings. References resolve against `base_url`, which must be
/// the stylesheet's own URL (or the page URL for inline styles).
pub fn extract_css_resources(css: &str, base_url: &Url, scope: &ScopeClassifier) -> HashSet<Url> {
    let mut resources = HashSet::new();

    for pattern in [css_url_pattern(), css_import_pattern()] {
        for captures in pattern.captures_iter(css) {
            let reference = captures
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str());
            if let Some(reference) = reference {
                insert_candidate(&mut resources, reference, base_url, scope);
            }
        }
    }

    resources
}

/// Extracts resource paths embedded in a JSON manifest
///
/// Walks objects and arrays recursively and keeps every string that starts
/// with one of `prefixes` followed by `/` (for example `images/bg.png` with
/// the prefix `images`). Nothing else about the manifest's schema is assumed.
pub fn extract_manifest_resources(
    manifest: &Value,
    base_url: &Url,
    prefixes: &[String],
    scope: &ScopeClassifier,
) -> HashSet<Url> {
    let mut paths = Vec::new();
    collect_prefixed_strings(manifest, prefixes, &mut paths);

    let mut resources = HashSet::new();
    for path in paths {
        insert_candidate(&mut resources, &path, base_url, scope);
    }
    resources
}

fn collect_prefixed_strings(value: &Value, prefixes: &[String], out: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            if let Some(cleaned) = clean_reference(text) {
                if has_resource_prefix(&cleaned, prefixes) {
                    out.push(cleaned);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_prefixed_strings(item, prefixes, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_prefixed_strings(item, prefixes, out);
            }
        }
        _ => {}
    }
}

fn has_resource_prefix(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        path.strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Splits a `srcset` value into its URL candidates
fn parse_srcset(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
}

fn insert_candidate(resources: &mut HashSet<Url>, raw: &str, base_url: &Url, scope: &ScopeClassifier) {
    if let Some(url) = scope.classify(raw, base_url) {
        resources.insert(url);
    }
}
