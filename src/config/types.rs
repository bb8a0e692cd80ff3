use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a collector run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub collector: CollectorConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
}

/// Identity of the collector and where its crawl starts
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Collector name; namespaces cache, checkpoint and metrics files
    pub name: String,

    /// Seed URLs; all must share one base domain
    pub seeds: Vec<String>,
}

/// Crawl bounds and worker pool size
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of BFS levels to process
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Stop once this many records have been collected
    #[serde(default = "default_max_items")]
    pub max_items: u64,

    /// Concurrent fetches per batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request network timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Optional wall-clock budget for the whole crawl (seconds)
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

/// Retry/backoff settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Total attempts per request, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds; attempt n waits `factor * 2^(n-2)`
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Apply +/-20% jitter to backoff waits
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Budget for one request including every retry and wait (seconds)
    #[serde(default)]
    pub total_timeout_secs: Option<u64>,
}

/// Outbound request pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    /// Lower bound of the inter-request delay (milliseconds)
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the inter-request delay (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Maximum outbound requests per run; `None` means unlimited
    #[serde(default)]
    pub daily_quota: Option<u64>,
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root cache directory; each collector gets a subdirectory
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Entry lifetime (seconds)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

/// Degradation policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FallbackConfig {
    /// Error ratio above which live collection is abandoned
    #[serde(default = "default_error_ratio")]
    pub error_ratio_threshold: f64,

    /// Attempts required before the error ratio is considered
    #[serde(default = "default_min_attempts")]
    pub min_attempts: u64,
}

/// Where durable run state is written
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding checkpoint and metrics sidecar files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

/// User agent identification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_agent_version")]
    pub version: String,

    #[serde(default)]
    pub contact_url: Option<String>,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl RetryConfig {
    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout_secs.map(Duration::from_secs)
    }
}

impl RateLimitConfig {
    pub fn delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!("{}/{} (+{})", self.name, self.version, contact),
            None => format!("{}/{}", self.name, self.version),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_items: default_max_items(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
            deadline_secs: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            jitter: true,
            total_timeout_secs: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
            daily_quota: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            error_ratio_threshold: default_error_ratio(),
            min_attempts: default_min_attempts(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            version: default_agent_version(),
            contact_url: None,
        }
    }
}

fn default_max_depth() -> u32 {
    5
}

fn default_max_items() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    0.5
}

fn default_min_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    3000
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

// 24 hours
fn default_cache_ttl() -> u64 {
    86_400
}

fn default_error_ratio() -> f64 {
    0.2
}

fn default_min_attempts() -> u64 {
    5
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_agent_name() -> String {
    "leadcrawl".to_string()
}

fn default_agent_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}
