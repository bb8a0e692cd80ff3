//! The fetch pipeline: cache, then rate limiter, then retry
//!
//! Every fetch in a run goes through here, including nested fetches made by
//! extractors, so none of them bypass the cache or the rate limiter.

use crate::crawler::CrawlContext;
use crate::extract::FetchHandle;
use crate::fetch::{execute, FetchRequest, FetchResponse, RetryExhausted};
use crate::limiter::QuotaExceeded;
use crate::metrics::FetchStats;
use crate::CrawlError;
use async_trait::async_trait;
use std::sync::Mutex;

/// Why the pipeline could not produce a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The request was made and failed for good
    Fetch(RetryExhausted),
    /// No request was made: the quota is spent
    Quota(QuotaExceeded),
}

impl From<PipelineError> for CrawlError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Fetch(exhausted) => CrawlError::Fetch(exhausted.last_error),
            PipelineError::Quota(quota) => quota.into(),
        }
    }
}

/// Resolves one request, accounting for it in `stats`
///
/// Fresh cache entries are returned without touching the network. On a miss
/// the rate limiter grants a slot, the retry executor performs the request,
/// and a successful response is written back to the cache.
pub async fn fetch_through(
    ctx: &CrawlContext,
    request: &FetchRequest,
    stats: &mut FetchStats,
) -> Result<FetchResponse, PipelineError> {
    let fingerprint = request.fingerprint();

    if ctx.cache.is_enabled() {
        if let Some(entry) = ctx.cache.get::<FetchResponse>(&fingerprint).await {
            tracing::debug!("Cache hit for {} {}", request.method, request.url);
            stats.cache_hits += 1;
            return Ok(entry.payload);
        }
        stats.cache_misses += 1;
    }

    ctx.limiter
        .wait_for_slot()
        .await
        .map_err(PipelineError::Quota)?;

    stats.requests += 1;
    match execute(ctx.fetcher.as_ref(), request, &ctx.retry).await {
        Ok(outcome) => {
            stats.retries += u64::from(outcome.retries());
            if let Err(e) = ctx.cache.put(&fingerprint, &outcome.value, ctx.cache_ttl).await {
                tracing::warn!("Failed to cache response for {}: {}", request.url, e);
            }
            Ok(outcome.value)
        }
        Err(exhausted) => {
            stats.retries += u64::from(exhausted.retries());
            stats.failures += 1;
            Err(PipelineError::Fetch(exhausted))
        }
    }
}

/// `FetchHandle` given to extractors for nested fetches
pub struct PipelineHandle<'a> {
    ctx: &'a CrawlContext,
    stats: Mutex<FetchStats>,
}

impl<'a> PipelineHandle<'a> {
    pub fn new(ctx: &'a CrawlContext) -> Self {
        Self {
            ctx,
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// Counters accumulated by nested fetches
    pub fn into_stats(self) -> FetchStats {
        self.stats
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FetchHandle for PipelineHandle<'_> {
    async fn fetch(&self, request: &FetchRequest) -> crate::Result<FetchResponse> {
        let mut local = FetchStats::default();
        let result = fetch_through(self.ctx, request, &mut local).await;
        match self.stats.lock() {
            Ok(mut stats) => stats.merge(&local),
            Err(poisoned) => poisoned.into_inner().merge(&local),
        }
        Ok(result?)
    }
}
