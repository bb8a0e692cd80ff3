//! Crawl driver and collector boundary
//!
//! This module ties the engine together:
//! - `CrawlContext`, the explicit state handed to every stage
//! - The fetch pipeline composing cache, rate limiter and retry
//! - The `Coordinator` running the BFS batch loop
//! - `Collector::collect()`, the entry point used by downstream consumers

mod collector;
mod context;
mod coordinator;
mod pipeline;

pub use collector::{CollectionMetadata, CollectionResult, Collector};
pub use context::CrawlContext;
pub use coordinator::{process_page, Coordinator, CrawlOutcome, PageOutcome, PageResult, StopReason};
pub use pipeline::{fetch_through, PipelineError, PipelineHandle};

pub use crate::metrics::DataSource;

use crate::config::Config;
use crate::Result;

/// Runs a complete collection for a configuration
///
/// Shorthand for `Collector::new(config)?.fresh(fresh).collect()`.
pub async fn collect(config: Config, fresh: bool) -> Result<CollectionResult> {
    Collector::new(config)?.fresh(fresh).collect().await
}
