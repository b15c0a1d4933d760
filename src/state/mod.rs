//! State tracking for a single crawl invocation

mod crawl_phase;

pub use crawl_phase::{CrawlPhase, PhaseTracker};
