//! leadcrawl: a resumable, rate-limited crawl-and-cache engine
//!
//! This crate implements the engine shared by every public-records collector:
//! a frontier-driven BFS fetch loop with TTL response caching, exponential
//! backoff retry, checkpoint/resume across restarts, pluggable extractors and
//! a metrics controller that falls back to cached or sample data when live
//! collection is unavailable.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod limiter;
pub mod metrics;
pub mod url;

use thiserror::Error;

/// Main error type for leadcrawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] extract::ExtractionError),

    #[error("Daily request quota of {quota} exhausted")]
    QuotaExceeded { quota: u64 },

    #[error("No seed URL reachable after full retry budget: {reason}")]
    FatalSeed { reason: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State directory error: {0}")]
    State(String),
}

impl From<limiter::QuotaExceeded> for CrawlError {
    fn from(err: limiter::QuotaExceeded) -> Self {
        Self::QuotaExceeded { quota: err.quota }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for leadcrawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CollectionMetadata, CollectionResult, Collector, DataSource};
pub use extract::{ExtractedRecord, Extractor, ExtractorRegistry};
pub use metrics::{Metrics, RunStatus};
pub use url::{extract_domain, normalize_url};
