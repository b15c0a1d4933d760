//! Crawl statistics and operator-facing reports
//!
//! Statistics are advisory: they are logged and printed for the operator and
//! never persisted.

use crate::crawler::{BatchSummary, FetchOutcome};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Counters aggregated over a set of fetched resources
///
/// `downloaded` only counts bodies that were actually transferred; resources
/// confirmed unchanged by the origin are counted in `up_to_date` instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Resources dispatched
    pub attempted: usize,

    /// Resources whose body was transferred and written
    pub downloaded: usize,

    /// Resources confirmed unchanged (or skipped as not worth fetching)
    pub up_to_date: usize,

    /// Resources whose fetch ended in an unrecovered error
    pub failed: usize,
}

impl CrawlStats {
    /// Counts one dispatched resource
    pub fn record(&mut self, outcome: FetchOutcome) {
        self.attempted += 1;
        if !outcome.success {
            self.failed += 1;
        } else if outcome.transferred {
            self.downloaded += 1;
        } else {
            self.up_to_date += 1;
        }
    }

    /// Adds another set of counters to this one
    pub fn merge(&mut self, other: &CrawlStats) {
        self.attempted += other.attempted;
        self.downloaded += other.downloaded;
        self.up_to_date += other.up_to_date;
        self.failed += other.failed;
    }

    /// Resources that ended on disk in their current version
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.up_to_date
    }

    /// The `(attempted, downloaded, failed)` triple handed to callers
    pub fn as_triple(&self) -> (usize, usize, usize) {
        (self.attempted, self.downloaded, self.failed)
    }
}

/// Result of mirroring one entry document
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// The entry URL the crawl was seeded with
    pub entry_url: Url,

    /// Mirror directory
    pub destination: PathBuf,

    /// Outcome of the entry document fetch
    pub entry: FetchOutcome,

    /// Outcome of the manifest fetch; `None` when it was never attempted
    pub manifest: Option<FetchOutcome>,

    /// Worker-pool resources, nested stylesheet references included
    pub resources: CrawlStats,

    /// Highest number of workers that were busy at the same time
    pub peak_workers: usize,

    /// Wall-clock duration of the crawl
    pub elapsed: Duration,
}

impl CrawlReport {
    /// Report for a crawl whose entry document could not be fetched
    pub fn entry_failure(entry_url: Url, destination: PathBuf, elapsed: Duration) -> Self {
        Self {
            entry_url,
            destination,
            entry: FetchOutcome::failed(),
            manifest: None,
            resources: CrawlStats::default(),
            peak_workers: 0,
            elapsed,
        }
    }

    /// True when the crawl stopped because the entry document failed
    pub fn entry_failed(&self) -> bool {
        !self.entry.success
    }

    /// Overall statistics, entry document and manifest included
    ///
    /// A failed entry document yields exactly `(0, 0, 1)`. A successful one
    /// counts as one attempted unit, as does a retrieved manifest. A missing
    /// manifest is optional and not counted at all.
    pub fn totals(&self) -> CrawlStats {
        if self.entry_failed() {
            return CrawlStats {
                failed: 1,
                ..CrawlStats::default()
            };
        }

        let mut totals = CrawlStats::default();
        totals.record(self.entry);
        if let Some(manifest) = self.manifest.filter(|m| m.success) {
            totals.record(manifest);
        }
        totals.merge(&self.resources);
        totals
    }
}

/// Prints a crawl report to stdout
pub fn print_report(report: &CrawlReport) {
    let totals = report.totals();

    println!("=== Mirror Report ===\n");
    println!("  URL:        {}", report.entry_url);
    println!("  Saved to:   {}", report.destination.display());
    println!("  Time:       {:.2}s", report.elapsed.as_secs_f64());

    if report.entry_failed() {
        println!("\n  Entry document could not be fetched; nothing else was attempted.");
        return;
    }

    let manifest = match report.manifest {
        Some(m) if m.success => "retrieved",
        Some(_) => "not available",
        None => "not attempted",
    };
    println!("  Manifest:   {}", manifest);
    println!();

    println!("Resources:");
    println!("  Attempted:  {}", totals.attempted);
    println!("  Downloaded: {}", totals.downloaded);
    println!("  Up to date: {}", totals.up_to_date);
    println!("  Failed:     {}", totals.failed);
    println!("  Peak workers: {}", report.peak_workers);

    let success_rate = if totals.attempted > 0 {
        (totals.succeeded() as f64 / totals.attempted as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "\nSuccess Rate: {:.1}% ({} / {} resources current on disk)",
        success_rate,
        totals.succeeded(),
        totals.attempted
    );
}

/// Formats the end-of-batch report as lines of text
pub fn format_batch_summary(summary: &BatchSummary) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "Batch finished at {}",
        summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.push(format!("  Entry URLs:  {}", summary.reports.len()));
    lines.push(format!("  Mirrored:    {}", summary.mirrored().len()));
    lines.push(format!("  Failed:      {}", summary.failed().len()));

    let totals = summary.totals();
    lines.push(format!(
        "  Resources:   {} attempted, {} downloaded, {} up to date, {} failed",
        totals.attempted, totals.downloaded, totals.up_to_date, totals.failed
    ));

    let failed = summary.failed();
    if !failed.is_empty() {
        lines.push("  Failed entry URLs:".to_string());
        for url in failed {
            lines.push(format!("    - {}", url));
        }
    }

    lines
}

/// Prints the end-of-batch report to stdout
pub fn print_batch_summary(summary: &BatchSummary) {
    println!("\n=== Batch Report ===");
    for line in format_batch_summary(summary) {
        println!("{}", line);
    }
}
