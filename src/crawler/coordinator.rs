//! Crawler coordinator - orchestration of one mirror
//!
//! A crawl walks through the phases of [`CrawlPhase`]:
//!
//! 1. `Init` - prepare the destination and the metadata store
//! 2. `EntryFetched` - the entry document is on disk (a failure ends the crawl)
//! 3. `ResourcesEnumerated` - references from the entry document and the
//!    sibling manifest are collected and deduplicated
//! 4. `Downloading` - resources go through a bounded worker pool; stylesheets
//!    are scanned for further references inside the worker that fetched them
//! 5. `Done` - statistics are handed back in a [`CrawlReport`]

use crate::config::Config;
use crate::crawler::extractor::{
    extract_css_resources, extract_html_resources, extract_manifest_resources,
};
use crate::crawler::fetcher::{ContentFetcher, FetchOutcome, FetchPhase};
use crate::crawler::metadata::MetadataStore;
use crate::crawler::transport::build_http_client;
use crate::output::{CrawlReport, CrawlStats};
use crate::state::{CrawlPhase, PhaseTracker};
use crate::url::{destination_path, manifest_url, ScopeClassifier};
use crate::{MirrorError, UrlError};
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Main crawler coordinator structure
///
/// Holds the configuration and one pooled HTTP client; a coordinator can run
/// any number of crawls one after another.
pub struct Coordinator {
    config: Arc<Config>,
    client: Client,
}

/// State shared by the workers of one crawl
struct CrawlContext {
    fetcher: ContentFetcher,
    scope: ScopeClassifier,
    entry_url: Url,
    destination: PathBuf,
    entry_file: String,
    /// Files owned by the crawl itself (entry, manifest, metadata)
    reserved: Vec<PathBuf>,
    seen: Mutex<HashSet<Url>>,
    busy: AtomicUsize,
    peak: AtomicUsize,
}

impl CrawlContext {
    fn local_path(&self, url: &Url) -> PathBuf {
        destination_path(url, &self.entry_url, &self.destination, &self.entry_file)
    }

    /// Marks `url` as dispatched; false when it already was or when it would
    /// land on a file owned by the crawl
    fn claim(&self, url: &Url) -> bool {
        if is_reserved(&self.local_path(url), &self.reserved) {
            tracing::debug!(
                url = %url,
                phase = FetchPhase::Classification.as_str(),
                "reference maps onto a reserved file"
            );
            return false;
        }
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(url.clone()),
            Err(_) => false,
        }
    }

    fn worker_started(&self) {
        let busy = self.busy.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(busy, Ordering::SeqCst);
    }

    fn worker_finished(&self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to crawl
    /// * `Err(MirrorError)` - The HTTP client could not be built
    pub fn new(config: Config) -> Result<Self, MirrorError> {
        let client = build_http_client(&config)?;
        Ok(Self::with_client(config, client))
    }

    /// Creates a coordinator around an existing HTTP client
    pub fn with_client(config: Config, client: Client) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mirrors `entry_url` and everything it references into `destination`
    ///
    /// Individual resource failures never surface as errors; they are counted
    /// in the report. An entry document that cannot be fetched ends the crawl
    /// with a report whose totals are `(0, 0, 1)`.
    ///
    /// # Errors
    ///
    /// Only setup failures are returned: an entry URL without a host or a
    /// destination directory that cannot be created.
    pub async fn crawl(&self, entry_url: &Url, destination: &Path) -> Result<CrawlReport, MirrorError> {
        let start_time = Instant::now();
        let mut phases = PhaseTracker::new();

        let scope = ScopeClassifier::for_entry(entry_url).ok_or(UrlError::MissingHost)?;
        tokio::fs::create_dir_all(destination).await?;

        tracing::info!(url = %entry_url, stage = %phases.current(), "starting mirror into {}", destination.display());

        let metadata_path = destination.join(&self.config.output.metadata_file);
        let metadata = Arc::new(MetadataStore::new(&metadata_path));
        let fetcher = ContentFetcher::new(self.client.clone(), &self.config, metadata);

        let entry_path = destination.join(&self.config.output.entry_file);
        let entry = fetcher.fetch(entry_url, &entry_path).await;
        if !entry.success {
            phases.advance(CrawlPhase::Done)?;
            tracing::error!(
                url = %entry_url,
                phase = FetchPhase::Download.as_str(),
                "entry document could not be fetched"
            );
            return Ok(CrawlReport::entry_failure(
                entry_url.clone(),
                destination.to_path_buf(),
                start_time.elapsed(),
            ));
        }
        phases.advance(CrawlPhase::EntryFetched)?;

        let mut resources = match tokio::fs::read(&entry_path).await {
            Ok(raw) => extract_html_resources(&String::from_utf8_lossy(&raw), entry_url, &scope),
            Err(e) => {
                tracing::warn!(
                    url = %entry_url,
                    phase = FetchPhase::Extraction.as_str(),
                    error = %e,
                    "entry document unreadable"
                );
                HashSet::new()
            }
        };
        let html_count = resources.len();

        let manifest_location = manifest_url(entry_url, &self.config.manifest.file_name)?;
        let manifest_path = destination.join(&self.config.manifest.file_name);
        let manifest = fetcher.fetch(&manifest_location, &manifest_path).await;
        if manifest.success {
            resources.extend(
                self.manifest_resources(&manifest_location, &manifest_path, &scope)
                    .await,
            );
        } else {
            tracing::info!(url = %manifest_location, stage = %phases.current(), "no manifest available");
        }

        // Nothing may overwrite the entry document, the manifest or the
        // metadata file, whatever URL it came from
        let reserved = vec![entry_path, manifest_path, metadata_path];
        let entry_file = &self.config.output.entry_file;

        let mut seen = HashSet::new();
        seen.insert(entry_url.clone());
        seen.insert(manifest_location.clone());
        resources.retain(|url| {
            if seen.contains(url) {
                return false;
            }
            let local = destination_path(url, entry_url, destination, entry_file);
            if is_reserved(&local, &reserved) {
                tracing::debug!(
                    url = %url,
                    phase = FetchPhase::Classification.as_str(),
                    "reference maps onto a reserved file"
                );
                return false;
            }
            true
        });
        seen.extend(resources.iter().cloned());

        phases.advance(CrawlPhase::ResourcesEnumerated)?;
        tracing::info!(
            url = %entry_url,
            stage = %phases.current(),
            from_html = html_count,
            total = resources.len(),
            "resources enumerated"
        );

        let context = Arc::new(CrawlContext {
            fetcher,
            scope,
            entry_url: entry_url.clone(),
            destination: destination.to_path_buf(),
            entry_file: self.config.output.entry_file.clone(),
            reserved,
            seen: Mutex::new(seen),
            busy: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        phases.advance(CrawlPhase::Downloading)?;
        let mut queue: Vec<Url> = resources.into_iter().collect();
        queue.sort();
        let stats = self.run_pool(Arc::clone(&context), queue).await?;

        phases.advance(CrawlPhase::Done)?;
        tracing::debug!(url = %entry_url, timings = ?phases.timings(), "phase timings");

        let report = CrawlReport {
            entry_url: entry_url.clone(),
            destination: destination.to_path_buf(),
            entry,
            manifest: Some(manifest),
            resources: stats,
            peak_workers: context.peak.load(Ordering::SeqCst),
            elapsed: start_time.elapsed(),
        };

        let totals = report.totals();
        tracing::info!(
            url = %entry_url,
            stage = %phases.current(),
            attempted = totals.attempted,
            downloaded = totals.downloaded,
            up_to_date = totals.up_to_date,
            failed = totals.failed,
            "mirror complete in {:.2}s",
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

    async fn manifest_resources(
        &self,
        manifest_url: &Url,
        manifest_path: &Path,
        scope: &ScopeClassifier,
    ) -> HashSet<Url> {
        let parsed = tokio::fs::read_to_string(manifest_path)
            .await
            .map_err(MirrorError::from)
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).map_err(MirrorError::from));

        match parsed {
            Ok(manifest) => extract_manifest_resources(
                &manifest,
                manifest_url,
                &self.config.manifest.resource_prefixes,
                scope,
            ),
            Err(e) => {
                tracing::warn!(
                    url = %manifest_url,
                    phase = FetchPhase::Extraction.as_str(),
                    error = %e,
                    "manifest could not be parsed"
                );
                HashSet::new()
            }
        }
    }

    /// Runs every queued resource through the bounded worker pool
    async fn run_pool(&self, context: Arc<CrawlContext>, queue: Vec<Url>) -> Result<CrawlStats, MirrorError> {
        let semaphore = Arc::new(Semaphore::new(self.config.crawler.concurrency.max(1)));
        let mut workers = JoinSet::new();
        let mut stats = CrawlStats::default();

        for url in queue {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| MirrorError::Pool(e.to_string()))?;
            let context = Arc::clone(&context);

            workers.spawn(async move {
                let _permit = permit;
                context.worker_started();
                let stats = process_resource(&context, url).await;
                context.worker_finished();
                stats
            });
        }

        while let Some(joined) = workers.join_next().await {
            merge_worker(&mut stats, joined);
        }

        Ok(stats)
    }
}

fn merge_worker(stats: &mut CrawlStats, joined: Result<CrawlStats, tokio::task::JoinError>) {
    match joined {
        Ok(worker_stats) => stats.merge(&worker_stats),
        Err(e) => {
            tracing::error!(phase = FetchPhase::Download.as_str(), error = %e, "worker aborted");
            stats.record(FetchOutcome::failed());
        }
    }
}

/// Fetches one resource and, for stylesheets, everything they pull in
///
/// Nested references are fetched sequentially by the same worker. Each URL is
/// claimed in the crawl-wide seen set first, so stylesheet cycles terminate.
async fn process_resource(context: &CrawlContext, url: Url) -> CrawlStats {
    let mut stats = CrawlStats::default();
    let mut pending = VecDeque::from([url]);

    while let Some(url) = pending.pop_front() {
        let path = context.local_path(&url);
        let outcome = context.fetcher.fetch(&url, &path).await;
        stats.record(outcome);

        if !outcome.success || !is_stylesheet(&url) {
            continue;
        }

        let css = match tokio::fs::read(&path).await {
            Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
            Err(e) => {
                tracing::warn!(
                    url = %url,
                    phase = FetchPhase::Extraction.as_str(),
                    error = %e,
                    "stylesheet unreadable"
                );
                continue;
            }
        };

        let mut nested: Vec<Url> = extract_css_resources(&css, &url, &context.scope)
            .into_iter()
            .filter(|candidate| context.claim(candidate))
            .collect();
        nested.sort();

        if !nested.is_empty() {
            tracing::debug!(
                url = %url,
                phase = FetchPhase::Extraction.as_str(),
                count = nested.len(),
                "stylesheet references"
            );
        }
        pending.extend(nested);
    }

    stats
}

fn is_reserved(path: &Path, reserved: &[PathBuf]) -> bool {
    reserved.iter().any(|owned| owned == path)
}

fn is_stylesheet(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".css")
}

/// Mirrors one entry URL with a fresh coordinator
///
/// # Example
///
/// ```no_run
/// use asset_mirror::{crawl, Config};
/// use std::path::Path;
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let entry = Url::parse("https://games.example.com/space_race/")?;
/// let report = crawl(&entry, Path::new("mirror"), Config::default()).await?;
/// let (attempted, downloaded, failed) = report.totals().as_triple();
/// println!("{} attempted, {} downloaded, {} failed", attempted, downloaded, failed);
/// # Ok(())
/// # }
/// ```
pub async fn crawl(entry_url: &Url, destination: &Path, config: Config) -> Result<CrawlReport, MirrorError> {
    Coordinator::new(config)?.crawl(entry_url, destination).await
}
