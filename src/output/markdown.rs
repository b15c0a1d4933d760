//! Catalog draft generation from a mirrored manifest
//!
//! The manifest next to a game page usually carries the page copy as data
//! (`rows[].titleText`, `rows[].objects[].text`, ...). This module turns it
//! into a markdown draft that later catalog tooling can summarize.

use crate::output::OutputResult;
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

/// File name of the markdown draft inside a mirror directory
pub const CATALOG_FILE: &str = "catalog.md";

/// Renders a manifest as a markdown catalog draft
///
/// The draft always starts with the page URL and a guessed title taken from
/// the page folder name. The body depends on the manifest layout:
///
/// | Layout | Rendering |
/// |--------|-----------|
/// | `rows[]` | `## title` + `titleText`, then `### title` + `text` per `objects[]` entry |
/// | `content` | `# title` + `content` |
/// | `sections[]` | `## title` + `text` per section |
/// | other object | `## key` + value for every top-level string |
pub fn render_manifest_markdown(manifest: &Value, entry_url: &Url) -> String {
    let mut md = String::new();

    md.push_str(&format!("Game URL: {}\n\n", entry_url));
    md.push_str(&format!("Possible title: {}\n\n", possible_title(entry_url)));

    let blocks = manifest_blocks(manifest);
    md.push_str(&blocks.join("\n"));

    md
}

/// Renders the manifest at `manifest_path` and writes the draft to
/// `<destination>/catalog.md`
///
/// Returns `Ok(None)` when the mirror has no manifest.
pub fn write_manifest_markdown(
    manifest_path: &Path,
    destination: &Path,
    entry_url: &Url,
) -> OutputResult<Option<PathBuf>> {
    if !manifest_path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(manifest_path)?;
    let manifest: Value = serde_json::from_str(&raw)?;
    let markdown = render_manifest_markdown(&manifest, entry_url);

    let output_path = destination.join(CATALOG_FILE);
    let mut file = File::create(&output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(Some(output_path))
}

/// Page folder name with underscores turned into spaces
fn possible_title(entry_url: &Url) -> String {
    let segments: Vec<&str> = entry_url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let folder = match segments.as_slice() {
        [.., dir, file] if file.contains('.') => Some(*dir),
        [.., last] => Some(*last),
        [] => None,
    };

    folder
        .map(|name| name.replace('_', " "))
        .unwrap_or_else(|| entry_url.host_str().unwrap_or_default().to_string())
}

fn manifest_blocks(manifest: &Value) -> Vec<String> {
    let mut blocks = Vec::new();

    let Some(object) = manifest.as_object() else {
        return blocks;
    };

    if let Some(rows) = object.get("rows").and_then(Value::as_array) {
        for row in rows {
            if let Some(text) = row.get("titleText").and_then(Value::as_str) {
                blocks.push(format!("## {}\n", str_field(row, "title")));
                blocks.push(format!("{}\n", text));
            }

            for obj in row
                .get("objects")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(title) = obj.get("title").and_then(Value::as_str) {
                    blocks.push(format!("### {}\n", title));
                }
                if let Some(text) = obj.get("text").and_then(Value::as_str) {
                    blocks.push(format!("{}\n", text));
                }
            }
        }
    } else if let Some(content) = object.get("content").and_then(Value::as_str) {
        let title = object
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled");
        blocks.push(format!("# {}\n", title));
        blocks.push(format!("{}\n", content));
    } else if let Some(sections) = object.get("sections").and_then(Value::as_array) {
        for section in sections {
            blocks.push(format!("## {}\n", str_field(section, "title")));
            blocks.push(format!("{}\n", str_field(section, "text")));
        }
    } else {
        for (key, value) in object {
            if let Some(text) = value.as_str() {
                blocks.push(format!("## {}\n", key));
                blocks.push(format!("{}\n", text));
            }
        }
    }

    blocks
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}
