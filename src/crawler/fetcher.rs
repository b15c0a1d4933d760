//! Content fetching with entity-tag revalidation
//!
//! Fetching one resource follows this flow:
//!
//! 1. Skip favicons and inline `data:` URIs outright
//! 2. When the file is already on disk and an entity tag is stored for it,
//!    send a conditional `HEAD`; a `304` or an identical `ETag` ends the fetch
//! 3. Otherwise `GET` the body (with retries) and write it atomically:
//!    - text content is re-encoded to UTF-8
//!    - anything else is streamed chunk by chunk
//! 4. Record the response's entity tag, then pause for the politeness delay
//!
//! No error leaves [`ContentFetcher::fetch`]; every failure is logged with the
//! offending URL and reported as a failed [`FetchOutcome`].

use crate::config::Config;
use crate::crawler::metadata::MetadataStore;
use crate::crawler::transport::RetryPolicy;
use crate::MirrorError;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use reqwest::{Client, Response, StatusCode};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use url::Url;

/// File suffixes always treated as text
const TEXT_SUFFIXES: &[&str] = &[".html", ".htm", ".js", ".css", ".json", ".txt", ".xml", ".svg"];

/// Result of fetching one resource
///
/// `success` means the destination holds the current version (freshly
/// transferred or confirmed unchanged); `transferred` means a body was
/// actually downloaded and written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub success: bool,
    pub transferred: bool,
}

impl FetchOutcome {
    pub fn failed() -> Self {
        Self {
            success: false,
            transferred: false,
        }
    }

    pub fn up_to_date() -> Self {
        Self {
            success: true,
            transferred: false,
        }
    }

    pub fn transferred() -> Self {
        Self {
            success: true,
            transferred: true,
        }
    }

    /// Resources never worth fetching count as satisfied
    pub fn skipped() -> Self {
        Self::up_to_date()
    }
}

/// Step of a fetch, recorded with every failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Classification,
    CacheCheck,
    Download,
    Metadata,
    Extraction,
}

impl FetchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchPhase::Classification => "classification",
            FetchPhase::CacheCheck => "cache-check",
            FetchPhase::Download => "download",
            FetchPhase::Metadata => "metadata",
            FetchPhase::Extraction => "extraction",
        }
    }
}

/// A fetch error tagged with the step it happened in
#[derive(Debug)]
struct FetchFailure {
    phase: FetchPhase,
    error: MirrorError,
}

trait InPhase<T> {
    fn in_phase(self, phase: FetchPhase) -> Result<T, FetchFailure>;
}

impl<T, E: Into<MirrorError>> InPhase<T> for Result<T, E> {
    fn in_phase(self, phase: FetchPhase) -> Result<T, FetchFailure> {
        self.map_err(|e| FetchFailure {
            phase,
            error: e.into(),
        })
    }
}

/// Downloads resources into a mirror directory
#[derive(Debug)]
pub struct ContentFetcher {
    client: Client,
    retry: RetryPolicy,
    metadata: Arc<MetadataStore>,
    request_timeout: Duration,
    politeness_delay: Duration,
    chunk_size: usize,
}

impl ContentFetcher {
    pub fn new(client: Client, config: &Config, metadata: Arc<MetadataStore>) -> Self {
        Self {
            client,
            retry: RetryPolicy::from_config(&config.retry),
            metadata,
            request_timeout: config.crawler.request_timeout(),
            politeness_delay: config.crawler.politeness_delay(),
            chunk_size: config.crawler.chunk_size.max(1),
        }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Fetches `url` into `destination`
    ///
    /// Never fails: errors are logged with the step they happened in and
    /// turned into [`FetchOutcome::failed`].
    pub async fn fetch(&self, url: &Url, destination: &Path) -> FetchOutcome {
        match self.try_fetch(url, destination).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                tracing::warn!(
                    url = %url,
                    phase = failure.phase.as_str(),
                    error = %failure.error,
                    "resource fetch failed"
                );
                FetchOutcome::failed()
            }
        }
    }

    async fn try_fetch(&self, url: &Url, destination: &Path) -> Result<FetchOutcome, FetchFailure> {
        if is_skipped(url) {
            tracing::debug!(url = %url, phase = FetchPhase::Classification.as_str(), "skipping resource");
            return Ok(FetchOutcome::skipped());
        }

        if destination.exists() {
            let stored = self
                .metadata
                .load_etag(url)
                .await
                .in_phase(FetchPhase::CacheCheck)?;
            if let Some(etag) = stored {
                if self.is_unchanged(url, &etag).await {
                    tracing::debug!(url = %url, phase = FetchPhase::CacheCheck.as_str(), "resource is up to date");
                    return Ok(FetchOutcome::up_to_date());
                }
            }
        }

        let etag = self
            .download(url, destination)
            .await
            .in_phase(FetchPhase::Download)?;

        // Fingerprint only after the content is in place
        self.metadata
            .store_etag(url, etag)
            .await
            .in_phase(FetchPhase::Metadata)?;

        tracing::debug!(
            url = %url,
            phase = FetchPhase::Download.as_str(),
            path = %destination.display(),
            "resource downloaded"
        );

        tokio::time::sleep(self.politeness_delay).await;

        Ok(FetchOutcome::transferred())
    }

    /// Transfers the body into `destination`, returning the response's `ETag`
    async fn download(&self, url: &Url, destination: &Path) -> Result<Option<String>, MirrorError> {
        let response = self.retry.send(url, || self.client.get(url.clone())).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let etag = header_value(&response, ETAG.as_str());
        let content_type = header_value(&response, CONTENT_TYPE.as_str());

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if is_text_content(destination, content_type.as_deref()) {
            self.write_text(response, destination, content_type.as_deref())
                .await?;
        } else {
            self.write_binary(response, destination).await?;
        }

        Ok(etag)
    }

    /// Conditional `HEAD`; any failure means "download again"
    async fn is_unchanged(&self, url: &Url, etag: &str) -> bool {
        let response = self
            .client
            .head(url.clone())
            .header(IF_NONE_MATCH, etag)
            .timeout(self.request_timeout)
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::NOT_MODIFIED => true,
            Ok(response) if response.status().is_success() => {
                header_value(&response, ETAG.as_str()).as_deref() == Some(etag)
            }
            Ok(response) => {
                tracing::debug!(
                    url = %url,
                    phase = FetchPhase::CacheCheck.as_str(),
                    status = response.status().as_u16(),
                    "revalidation inconclusive"
                );
                false
            }
            Err(e) => {
                tracing::debug!(
                    url = %url,
                    phase = FetchPhase::CacheCheck.as_str(),
                    error = %e,
                    "revalidation failed"
                );
                false
            }
        }
    }

    async fn write_text(
        &self,
        mut response: Response,
        destination: &Path,
        content_type: Option<&str>,
    ) -> Result<(), MirrorError> {
        let mut raw = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            raw.extend_from_slice(&chunk);
        }

        let text = decode_text(&raw, content_type);

        let mut file = temp_file_for(destination)?;
        file.write_all(text.as_bytes())?;
        file.persist(destination).map_err(|e| MirrorError::Io(e.error))?;
        Ok(())
    }

    async fn write_binary(&self, mut response: Response, destination: &Path) -> Result<(), MirrorError> {
        let file = temp_file_for(destination)?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk)?;
        }

        let file = writer.into_inner().map_err(|e| MirrorError::Io(e.into_error()))?;
        file.persist(destination).map_err(|e| MirrorError::Io(e.error))?;
        Ok(())
    }
}

/// Favicons and inline data are never fetched
pub fn is_skipped(url: &Url) -> bool {
    url.scheme() == "data" || url.path().to_ascii_lowercase().ends_with("favicon.ico")
}

/// Decides whether a body is text to be re-encoded as UTF-8
///
/// The local file name decides first, so an entry page saved as
/// `index.html` is text whatever the origin claims it is.
pub fn is_text_content(destination: &Path, content_type: Option<&str>) -> bool {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if TEXT_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix)) {
        return true;
    }

    content_type
        .map(|ct| ct.to_ascii_lowercase())
        .is_some_and(|ct| ct.contains("text") || ct.contains("javascript"))
}

/// Decodes text bytes in their detected encoding
///
/// A byte-order mark wins, then a `charset` parameter in the content type,
/// then statistical detection. Undecodable sequences become U+FFFD.
pub fn decode_text(raw: &[u8], content_type: Option<&str>) -> String {
    let encoding = Encoding::for_bom(raw)
        .map(|(encoding, _)| encoding)
        .or_else(|| content_type.and_then(charset_of))
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(raw, true);
            detector.guess(None, true)
        });

    let (text, _, had_errors) = encoding.decode(raw);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "text contained malformed sequences");
    }
    text.into_owned()
}

fn charset_of(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| Encoding::for_label(value.trim().trim_matches('"').as_bytes()))
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn temp_file_for(destination: &Path) -> Result<NamedTempFile, MirrorError> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(NamedTempFile::new_in(dir)?)
}
