//! reqwest-backed fetcher
//!
//! Handles:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Mapping transport errors and status codes onto `FetchError`
//! - Decoding bodies (JSON bodies are parsed eagerly)

use crate::config::UserAgentConfig;
use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, HttpMethod};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use leadcrawl::config::UserAgentConfig;
/// use leadcrawl::fetch::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// The production `Fetcher`
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.as_str();

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()),
        };
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            if serde_json::from_str::<serde_json::Value>(body).is_ok() {
                builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url, status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        let mut fetched = FetchResponse {
            status: status.as_u16(),
            final_url,
            content_type,
            body,
            byte_len: bytes.len(),
            parsed: None,
        };

        if fetched.is_json() {
            let parsed = serde_json::from_str(&fetched.body).map_err(|e| FetchError::Parse {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            fetched.parsed = Some(parsed);
        }

        Ok(fetched)
    }
}

/// Maps a reqwest error onto the retry taxonomy
fn classify_transport_error(url: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Transient {
            url: url.to_string(),
            reason: "Request timeout".to_string(),
            status: None,
        }
    } else if error.is_connect() {
        FetchError::Transient {
            url: url.to_string(),
            reason: format!("Connection failed: {}", error),
            status: None,
        }
    } else if error.is_decode() || error.is_body() {
        FetchError::Parse {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        FetchError::Permanent {
            url: url.to_string(),
            reason: error.to_string(),
            status: error.status().map(|s| s.as_u16()),
        }
    }
}
