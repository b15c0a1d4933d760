//! Batch mirroring from a links file
//!
//! A links file lists one entry URL per line; blank lines and lines starting
//! with `#` are ignored. Each entry is mirrored into
//! `<destination-root>/<host>/<last path segment>` one after another, all
//! crawls sharing the coordinator's HTTP client.

use crate::crawler::coordinator::Coordinator;
use crate::output::{write_manifest_markdown, CrawlReport, CrawlStats};
use crate::url::mirror_directory;
use crate::{ConfigError, ConfigResult};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Outcome of a batch run
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// One report per entry URL, in links-file order
    pub reports: Vec<CrawlReport>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    /// Entry URLs whose entry document was mirrored
    pub fn mirrored(&self) -> Vec<&Url> {
        self.reports
            .iter()
            .filter(|r| !r.entry_failed())
            .map(|r| &r.entry_url)
            .collect()
    }

    /// Entry URLs whose entry document could not be fetched
    pub fn failed(&self) -> Vec<&Url> {
        self.reports
            .iter()
            .filter(|r| r.entry_failed())
            .map(|r| &r.entry_url)
            .collect()
    }

    /// Statistics summed over every crawl of the batch
    pub fn totals(&self) -> CrawlStats {
        let mut totals = CrawlStats::default();
        for report in &self.reports {
            totals.merge(&report.totals());
        }
        totals
    }
}

/// Reads entry URLs from a links file
///
/// Lines that do not parse as `http`/`https` URLs are logged and skipped.
///
/// # Errors
///
/// Returns `ConfigError::Io` when the file cannot be read.
pub fn load_links(path: &Path) -> ConfigResult<Vec<Url>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_links(&content))
}

/// Parses links-file content; see [`load_links`]
pub fn parse_links(content: &str) -> Vec<Url> {
    let mut urls = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_entry_url(line) {
            Ok(url) => {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            Err(e) => tracing::warn!(line = index + 1, "skipping links entry: {}", e),
        }
    }

    urls
}

/// Parses one entry URL given on the command line or in a links file
pub fn parse_entry_url(raw: &str) -> ConfigResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ConfigError::InvalidUrl(raw.to_string())),
    }
}

/// Mirrors every entry URL into its own directory below `root`
///
/// A crawl that cannot even start (unwritable destination, for instance) is
/// logged and recorded as a failed entry; the batch always runs to the end.
/// With `markdown` set, a catalog draft is written next to every mirror that
/// has a manifest.
pub async fn mirror_all(coordinator: &Coordinator, urls: &[Url], root: &Path, markdown: bool) -> BatchSummary {
    let mut reports = Vec::with_capacity(urls.len());

    for (index, url) in urls.iter().enumerate() {
        tracing::info!(url = %url, "mirroring entry {}/{}", index + 1, urls.len());

        let destination = match mirror_directory(root, url) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "no mirror directory for entry");
                reports.push(CrawlReport::entry_failure(url.clone(), root.to_path_buf(), Duration::ZERO));
                continue;
            }
        };

        let report = match coordinator.crawl(url, &destination).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "crawl aborted");
                CrawlReport::entry_failure(url.clone(), destination.clone(), Duration::ZERO)
            }
        };

        if markdown && !report.entry_failed() {
            write_catalog(coordinator, &report);
        }

        reports.push(report);
    }

    BatchSummary {
        reports,
        finished_at: Utc::now(),
    }
}

/// Writes the catalog draft for a finished crawl, logging the result
pub fn write_catalog(coordinator: &Coordinator, report: &CrawlReport) {
    let manifest_path = report
        .destination
        .join(&coordinator.config().manifest.file_name);

    match write_manifest_markdown(&manifest_path, &report.destination, &report.entry_url) {
        Ok(Some(path)) => tracing::info!(url = %report.entry_url, "catalog draft written to {}", path.display()),
        Ok(None) => tracing::debug!(url = %report.entry_url, "no manifest, catalog draft skipped"),
        Err(e) => tracing::warn!(url = %report.entry_url, error = %e, "catalog draft failed"),
    }
}
