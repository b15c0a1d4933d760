use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (compatible; AssetMirror/0.4)";

/// Main configuration structure for Asset-Mirror
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub manifest: ManifestConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of resources fetched concurrently
    pub concurrency: usize,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Pause after every completed transfer (milliseconds)
    #[serde(rename = "politeness-delay")]
    pub politeness_delay: u64,

    /// Size of each write when streaming binary content (bytes)
    #[serde(rename = "chunk-size")]
    pub chunk_size: usize,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            request_timeout: 15,
            politeness_delay: 100,
            chunk_size: 8192,
        }
    }
}

/// Automatic retry policy for transient HTTP failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt on 429, 5xx, connect errors and timeouts
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base backoff (milliseconds); the n-th retry waits `base * 2^n`
    #[serde(rename = "backoff-base")]
    pub backoff_base: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 1000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    pub value: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            value: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory under which each mirror gets its own `<host>/<name>` folder
    #[serde(rename = "destination-root")]
    pub destination_root: PathBuf,

    /// File name of the entity-tag side table inside each mirror
    #[serde(rename = "metadata-file")]
    pub metadata_file: String,

    /// File name the entry document is saved under
    #[serde(rename = "entry-file")]
    pub entry_file: String,

    /// Log file; logs go to stderr when unset
    #[serde(rename = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            destination_root: PathBuf::from("downloaded_games"),
            metadata_file: "metadata.json".to_string(),
            entry_file: "index.html".to_string(),
            log_file: None,
        }
    }
}

/// Sibling manifest configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Well-known manifest file name next to the entry document
    #[serde(rename = "file-name")]
    pub file_name: String,

    /// Folder prefixes marking a manifest string value as a resource path
    #[serde(rename = "resource-prefixes")]
    pub resource_prefixes: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file_name: "project.json".to_string(),
            resource_prefixes: [
                "images", "music", "videos", "video", "fonts", "css", "js", "audio", "assets",
                "img",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
