//! Output module for crawl reports and catalog drafts
//!
//! This module handles:
//! - Aggregating and printing crawl statistics
//! - Rendering a mirrored manifest into a markdown catalog draft

mod markdown;
pub mod stats;

pub use markdown::{render_manifest_markdown, write_manifest_markdown, CATALOG_FILE};
pub use stats::{
    format_batch_summary, print_batch_summary, print_report, CrawlReport, CrawlStats,
};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
