//! Crawler module for mirroring an entry document and its resources
//!
//! This module contains the core mirroring logic, including:
//! - Resource extraction from HTML, CSS and JSON manifests
//! - HTTP transport with retries and entity-tag revalidation
//! - The per-mirror metadata store
//! - Crawl orchestration with a bounded worker pool
//! - Batch mirroring from a links file

pub mod batch;
mod coordinator;
mod extractor;
mod fetcher;
mod metadata;
mod transport;

pub use batch::{load_links, mirror_all, parse_entry_url, parse_links, BatchSummary};
pub use coordinator::{crawl, Coordinator};
pub use extractor::{extract_css_resources, extract_html_resources, extract_manifest_resources};
pub use fetcher::{
    decode_text, is_skipped, is_text_content, ContentFetcher, FetchOutcome, FetchPhase,
};
pub use metadata::{MetadataMap, MetadataStore, ResourceMetadata};
pub use transport::{build_http_client, RetryPolicy};
