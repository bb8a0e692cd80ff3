//! HTTP fetching
//!
//! This module contains:
//! - Request/response types shared by the cache and the extractors
//! - The `Fetcher` seam over the HTTP client
//! - Error classification into transient and permanent failures
//! - The retry/backoff executor

mod client;
mod retry;

pub use client::{build_http_client, ReqwestFetcher};
pub use retry::{execute, RetryExhausted, RetryOutcome, RetryPolicy};

use crate::cache::RequestFingerprint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Status codes worth retrying
pub const RETRYABLE_STATUS: &[u16] = &[429, 500, 502, 503, 504];

/// HTTP methods the collectors use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Description of one outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub params: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: Url, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            params: Vec::new(),
            body: Some(body.into()),
        }
    }

    /// Adds a query parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Cache identity of this request
    pub fn fingerprint(&self) -> RequestFingerprint {
        RequestFingerprint::compute(
            self.method.as_str(),
            &self.url,
            &self.params,
            self.body.as_deref(),
        )
    }
}

/// A successful response, in the form stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after redirects
    pub final_url: String,
    pub content_type: Option<String>,
    /// Body decoded as UTF-8 (lossy for binary documents)
    pub body: String,
    /// Size of the raw body in bytes
    pub byte_len: usize,
    /// Parsed form of a JSON body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<serde_json::Value>,
}

impl FetchResponse {
    fn content_type_contains(&self, needle: &str) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    }

    pub fn is_html(&self) -> bool {
        self.content_type_contains("text/html") || self.content_type_contains("xhtml")
    }

    pub fn is_json(&self) -> bool {
        self.content_type_contains("json")
    }
}

/// Why a fetch failed, classified for the retry executor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying: 429/5xx gateway errors, timeouts, refused connections
    #[error("Transient failure for {url}: {reason}")]
    Transient {
        url: String,
        reason: String,
        status: Option<u16>,
    },

    /// Retrying cannot help: 4xx other than 429, bad redirects, invalid requests
    #[error("Permanent failure for {url}: {reason}")]
    Permanent {
        url: String,
        reason: String,
        status: Option<u16>,
    },

    /// The response arrived but could not be decoded
    #[error("Failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    /// Classifies a non-success HTTP status
    pub fn from_status(url: &str, status: u16) -> Self {
        if RETRYABLE_STATUS.contains(&status) {
            Self::Transient {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
                status: Some(status),
            }
        } else {
            Self::Permanent {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
                status: Some(status),
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
            Self::Parse { .. } => None,
        }
    }
}

/// Seam over the network client
///
/// The crawl engine only talks to the network through this trait, which lets
/// tests script responses and lets collectors plug in alternative drivers
/// (a headless browser, for instance).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs exactly one network attempt
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;

    /// Whether the live-collection dependency can be used at all
    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        for status in [429, 500, 502, 503, 504] {
            assert!(FetchError::from_status("https://example.com/", status).is_retryable());
        }
        for status in [400, 401, 403, 404, 410, 501] {
            assert!(!FetchError::from_status("https://example.com/", status).is_retryable());
        }
    }

    #[test]
    fn test_parse_error_not_retryable() {
        let err = FetchError::Parse {
            url: "https://example.com/api".to_string(),
            message: "expected value".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_request_fingerprint_includes_params() {
        let url = Url::parse("https://example.com/search").unwrap();
        let a = FetchRequest::get(url.clone()).with_param("street", "MAIN ST");
        let b = FetchRequest::get(url).with_param("street", "ELM ST");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_content_type_checks() {
        let response = FetchResponse {
            status: 200,
            final_url: "https://example.com/".to_string(),
            content_type: Some("text/HTML; charset=utf-8".to_string()),
            body: String::new(),
            byte_len: 0,
            parsed: None,
        };
        assert!(response.is_html());
        assert!(!response.is_json());
    }
}
