//! Content extraction
//!
//! This module contains:
//! - The `Extractor` trait and the records it produces
//! - The priority-ordered `ExtractorRegistry`
//! - Shared link discovery
//! - The built-in extractors for assessor pages, tax maps, documents and
//!   generic page features

mod assessor;
mod document;
mod features;
mod links;
mod tax_map;

pub use assessor::AssessorExtractor;
pub use document::DocumentExtractor;
pub use features::PageFeatureExtractor;
pub use links::discover_links;
pub use tax_map::TaxMapExtractor;

use crate::fetch::{FetchRequest, FetchResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Classification given to pages no extractor claims
pub const GENERAL_CLASSIFICATION: &str = "general";

/// Errors raised by an extractor
///
/// These never stop a crawl: the page still contributes its links, just not
/// a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Malformed content at {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Page at {url} matched {extractor} but yielded no data")]
    NoData { url: String, extractor: String },
}

/// A structured record produced from one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    source_name: String,
    record_type: String,
    content: Value,
    discovered_links: Vec<String>,
    metadata: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl ExtractedRecord {
    pub fn new(source_name: impl Into<String>, record_type: impl Into<String>, content: Value) -> Self {
        Self {
            source_name: source_name.into(),
            record_type: record_type.into(),
            content,
            discovered_links: Vec::new(),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for link in links {
            let link = link.into();
            if !self.discovered_links.contains(&link) {
                self.discovered_links.push(link);
            }
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn discovered_links(&self) -> &[String] {
        &self.discovered_links
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the record came from the synthetic sample generator
    pub fn is_sample(&self) -> bool {
        self.metadata
            .get("using_sample_data")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A fetched page handed to the extractors
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub response: FetchResponse,
}

impl Page {
    pub fn new(url: Url, response: FetchResponse) -> Self {
        Self { url, response }
    }

    pub fn is_html(&self) -> bool {
        self.response.is_html()
    }
}

/// Route for nested fetches made during extraction
///
/// Implementations go through the same cache, rate limiter and retry policy
/// as the crawl itself.
#[async_trait]
pub trait FetchHandle: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> crate::Result<FetchResponse>;
}

/// A pluggable content extractor
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name used for logging and record classification
    fn name(&self) -> &str;

    /// Whether this extractor claims the page
    fn can_handle(&self, url: &Url, response: &FetchResponse) -> bool;

    /// Produces a record from a claimed page
    async fn extract(
        &self,
        page: &Page,
        fetcher: &dyn FetchHandle,
    ) -> Result<ExtractedRecord, ExtractionError>;
}

/// Result of running a page through the registry
#[derive(Debug)]
pub struct PageExtraction {
    /// Name of the extractor that claimed the page, or `general`
    pub classification: String,
    pub record: Option<ExtractedRecord>,
    /// Links for the frontier, in discovery order
    pub links: Vec<Url>,
    pub error: Option<ExtractionError>,
}

/// Priority-ordered set of extractors; the first match wins
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// An empty registry: every page is `general`
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// The built-in extractors in their default priority order
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(AssessorExtractor));
        registry.register(Box::new(TaxMapExtractor));
        registry.register(Box::new(DocumentExtractor));
        registry.register(Box::new(PageFeatureExtractor));
        registry
    }

    /// Appends an extractor at the lowest priority
    pub fn register(&mut self, extractor: Box<dyn Extractor>) -> &mut Self {
        self.extractors.push(extractor);
        self
    }

    /// Inserts an extractor ahead of every registered one
    pub fn register_first(&mut self, extractor: Box<dyn Extractor>) -> &mut Self {
        self.extractors.insert(0, extractor);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// First extractor whose `can_handle` accepts the page
    pub fn select(&self, url: &Url, response: &FetchResponse) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(url, response))
            .map(|e| e.as_ref())
    }

    /// Classifies a page, extracts its record and discovers its links
    pub async fn process(&self, page: &Page, fetcher: &dyn FetchHandle) -> PageExtraction {
        let links = if page.is_html() {
            discover_links(&page.response.body, &page.url)
        } else {
            Vec::new()
        };

        let Some(extractor) = self.select(&page.url, &page.response) else {
            tracing::debug!("{} classified as {}", page.url, GENERAL_CLASSIFICATION);
            return PageExtraction {
                classification: GENERAL_CLASSIFICATION.to_string(),
                record: None,
                links,
                error: None,
            };
        };

        let classification = extractor.name().to_string();
        tracing::debug!("{} claimed by {}", page.url, classification);

        match extractor.extract(page, fetcher).await {
            Ok(record) => {
                let record = record
                    .with_links(links.iter().map(|u| u.to_string()))
                    .with_metadata("url", page.url.as_str())
                    .with_metadata("extractor", classification.as_str());
                PageExtraction {
                    classification,
                    record: Some(record),
                    links,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!("Extraction failed for {}: {}", page.url, err);
                PageExtraction {
                    classification,
                    record: None,
                    links,
                    error: Some(err),
                }
            }
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}
