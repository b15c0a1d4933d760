/// Phase definitions for one crawl of an entry document
///
/// A crawl moves strictly forward through
/// `Init -> EntryFetched -> ResourcesEnumerated -> Downloading -> Done`.
/// A failed entry document is the one shortcut: `Init -> Done`.
use crate::MirrorError;
use std::fmt;
use std::time::{Duration, Instant};

/// Represents the current phase of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Destination prepared, nothing fetched yet
    Init,

    /// Entry document is on disk
    EntryFetched,

    /// Page and manifest parsed; the resource set is final
    ResourcesEnumerated,

    /// Worker pool is draining the resource set
    Downloading,

    /// Statistics are final
    Done,
}

impl CrawlPhase {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if `next` is a legal successor of this phase
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::EntryFetched)
                | (Self::Init, Self::Done)
                | (Self::EntryFetched, Self::ResourcesEnumerated)
                | (Self::ResourcesEnumerated, Self::Downloading)
                | (Self::Downloading, Self::Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::EntryFetched => "entry_fetched",
            Self::ResourcesEnumerated => "resources_enumerated",
            Self::Downloading => "downloading",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Enforces legal phase order and records how long each phase took
#[derive(Debug)]
pub struct PhaseTracker {
    current: CrawlPhase,
    entered_at: Instant,
    timings: Vec<(CrawlPhase, Duration)>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: CrawlPhase::Init,
            entered_at: Instant::now(),
            timings: Vec::new(),
        }
    }

    pub fn current(&self) -> CrawlPhase {
        self.current
    }

    /// Moves to `next`, failing on an illegal transition
    pub fn advance(&mut self, next: CrawlPhase) -> Result<(), MirrorError> {
        if !self.current.can_transition_to(next) {
            return Err(MirrorError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }

        let elapsed = self.entered_at.elapsed();
        tracing::debug!(from = %self.current, to = %next, ?elapsed, "crawl phase change");

        self.timings.push((self.current, elapsed));
        self.current = next;
        self.entered_at = Instant::now();
        Ok(())
    }

    /// Time spent in each completed phase, in order
    pub fn timings(&self) -> &[(CrawlPhase, Duration)] {
        &self.timings
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
