//! Crawler coordinator - the batch-driven BFS loop
//!
//! This module contains the crawl driver that moves one collector run through
//! its lifecycle:
//! - Restoring a checkpoint or seeding a fresh frontier
//! - Fetching each BFS level with bounded concurrency
//! - Committing page outcomes to the frontier and metrics
//! - Checkpointing after every batch and deciding when to stop

use crate::crawler::pipeline::{fetch_through, PipelineError, PipelineHandle};
use crate::crawler::CrawlContext;
use crate::extract::{ExtractedRecord, ExtractionError, Page};
use crate::fetch::{FetchError, FetchRequest};
use crate::frontier::{Checkpoint, FrontierState};
use crate::metrics::{FallbackReason, FetchStats, Metrics, RunStatus};
use crate::url::admit_link;
use crate::{CrawlError, Result};
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use url::Url;

/// What happened to one URL of a batch
#[derive(Debug)]
pub enum PageResult {
    /// Fetched and run through the extractor registry
    Processed {
        /// URL the response was served from, after redirects
        final_url: Url,
        classification: String,
        record: Option<ExtractedRecord>,
        links: Vec<Url>,
        extraction_error: Option<ExtractionError>,
    },
    /// Failed permanently or after the whole retry budget
    Failed { error: FetchError, attempts: u32 },
    /// Never requested: the daily quota is spent
    QuotaExceeded { quota: u64 },
}

/// A worker's report for one URL; only the driver applies it
#[derive(Debug)]
pub struct PageOutcome {
    pub url: Url,
    pub stats: FetchStats,
    pub result: PageResult,
}

/// Fetches one URL through the pipeline and extracts it
pub async fn process_page(ctx: &CrawlContext, url: Url) -> PageOutcome {
    let mut stats = FetchStats::default();
    let request = FetchRequest::get(url.clone());

    let response = match fetch_through(ctx, &request, &mut stats).await {
        Ok(response) => response,
        Err(PipelineError::Quota(exceeded)) => {
            return PageOutcome {
                url,
                stats,
                result: PageResult::QuotaExceeded {
                    quota: exceeded.quota,
                },
            };
        }
        Err(PipelineError::Fetch(exhausted)) => {
            tracing::warn!(
                "Giving up on {} after {} attempt(s): {}",
                url,
                exhausted.attempts,
                exhausted.last_error
            );
            return PageOutcome {
                url,
                stats,
                result: PageResult::Failed {
                    error: exhausted.last_error,
                    attempts: exhausted.attempts,
                },
            };
        }
    };

    // Relative links resolve against where the page was actually served from
    let final_url = Url::parse(&response.final_url).unwrap_or_else(|_| url.clone());
    let page = Page::new(final_url.clone(), response);

    let handle = PipelineHandle::new(ctx);
    let extraction = ctx.registry.process(&page, &handle).await;
    stats.merge(&handle.into_stats());

    tracing::debug!(
        "Processed {} as {} ({} links)",
        url,
        extraction.classification,
        extraction.links.len()
    );

    PageOutcome {
        url,
        stats,
        result: PageResult::Processed {
            final_url,
            classification: extraction.classification,
            record: extraction.record,
            links: extraction.links,
            extraction_error: extraction.error,
        },
    }
}

/// Why the crawl loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Nothing left in the frontier
    FrontierExhausted,
    MaxDepth,
    MaxItems,
    /// The run deadline expired; progress is checkpointed for a later run
    Deadline,
    /// The fallback controller abandoned live collection
    Fallback(FallbackReason),
    /// Every seed of a fresh run failed
    SeedsUnreachable(String),
}

impl StopReason {
    /// Stops after which the crawl has nothing left to resume
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::FrontierExhausted | Self::MaxDepth | Self::MaxItems | Self::SeedsUnreachable(_)
        )
    }
}

/// Result of one crawl run
#[derive(Debug)]
pub struct CrawlOutcome {
    pub status: RunStatus,
    pub stop: StopReason,
    pub records: Vec<ExtractedRecord>,
    pub metrics: Metrics,
    /// Frontier as the run left it
    pub frontier: FrontierState,
    /// Whether the run continued from a checkpoint
    pub resumed: bool,
}

impl CrawlOutcome {
    /// Reason to serve fallback data instead of the crawled records
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match &self.stop {
            StopReason::Fallback(reason) => Some(reason.clone()),
            StopReason::SeedsUnreachable(reason) => Some(FallbackReason::RunFailed {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Main crawler coordinator structure
///
/// The coordinator is the only writer of the frontier, the metrics and the
/// collected records. Workers return `PageOutcome` values.
pub struct Coordinator<'a> {
    ctx: &'a CrawlContext,
    frontier: FrontierState,
    metrics: Metrics,
    records: Vec<ExtractedRecord>,
    resumed: bool,
}

impl<'a> Coordinator<'a> {
    /// Restores the last checkpoint, or seeds a fresh frontier
    ///
    /// With `fresh` set, any existing checkpoint is discarded first.
    pub async fn restore(ctx: &'a CrawlContext, fresh: bool) -> Self {
        let max_depth = ctx.config.crawler.max_depth;
        let max_items = ctx.config.crawler.max_items;

        if fresh {
            if let Err(e) = ctx.checkpoints.delete().await {
                tracing::warn!("Failed to remove checkpoint {}: {}", ctx.checkpoints.path().display(), e);
            }
        } else if let Some(checkpoint) = ctx.checkpoints.load().await {
            if checkpoint.collector == ctx.collector
                && checkpoint.frontier.base_domain() == ctx.base_domain
            {
                tracing::info!(
                    "Resuming {} from checkpoint: depth {}, {} pending, {} visited, {} records",
                    ctx.collector,
                    checkpoint.frontier.depth(),
                    checkpoint.frontier.pending().len(),
                    checkpoint.frontier.visited().len(),
                    checkpoint.records.len()
                );
                return Self {
                    ctx,
                    frontier: checkpoint.frontier.with_limits(max_depth, max_items),
                    metrics: checkpoint.metrics,
                    records: checkpoint.records,
                    resumed: true,
                };
            }
            tracing::warn!(
                "Checkpoint {} belongs to {} ({}), starting fresh",
                ctx.checkpoints.path().display(),
                checkpoint.collector,
                checkpoint.frontier.base_domain()
            );
        }

        tracing::info!(
            "Seeding frontier for {} with {} seed(s)",
            ctx.collector,
            ctx.seeds.len()
        );
        Self {
            ctx,
            frontier: FrontierState::new(&ctx.seeds, ctx.base_domain.as_str(), max_depth, max_items),
            metrics: Metrics::new(),
            records: Vec::new(),
            resumed: false,
        }
    }

    pub fn frontier(&self) -> &FrontierState {
        &self.frontier
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Runs the crawl loop to termination
    ///
    /// Per-URL failures never end the run. Only a checkpoint that cannot be
    /// written is returned as an error.
    pub async fn run(mut self) -> Result<CrawlOutcome> {
        let ctx = self.ctx;
        let start_time = Instant::now();
        let deadline = ctx.deadline().map(|budget| start_time + budget);

        self.metrics.start();
        tracing::info!("Starting crawl for {} (base domain {})", ctx.collector, ctx.base_domain);

        let stop = loop {
            if self.frontier.items_reached(self.metrics.items_collected) {
                tracing::info!("Reached max items {}", self.frontier.max_items());
                break StopReason::MaxItems;
            }
            if self.frontier.is_exhausted() {
                tracing::info!("Frontier is empty, crawl complete");
                break StopReason::FrontierExhausted;
            }
            if self.frontier.depth_reached() {
                tracing::info!("Reached max depth {}", self.frontier.max_depth());
                break StopReason::MaxDepth;
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                tracing::info!("Deadline reached before depth {}", self.frontier.depth());
                break StopReason::Deadline;
            }

            let first_batch = !self.resumed && self.frontier.visited().is_empty();
            let batch = self.frontier.take_batch();
            tracing::info!("Processing depth {} ({} URLs)", self.frontier.depth(), batch.len());

            let outcomes = match self.fetch_batch(&batch, deadline).await {
                Some(outcomes) => outcomes,
                None => {
                    tracing::info!(
                        "Deadline reached mid-batch, returning {} URLs to the frontier",
                        batch.len()
                    );
                    self.frontier.restore_batch(&batch);
                    self.checkpoint().await?;
                    break StopReason::Deadline;
                }
            };

            if let Some(stop) = self.commit_batch(outcomes, first_batch) {
                // A failed seed batch leaves nothing worth resuming
                if !matches!(stop, StopReason::SeedsUnreachable(_)) {
                    self.checkpoint().await?;
                }
                break stop;
            }
            self.checkpoint().await?;

            if let Some(reason) = ctx.fallback.evaluate(&self.metrics) {
                tracing::warn!("Abandoning live crawl of {}: {}", ctx.collector, reason);
                break StopReason::Fallback(reason);
            }

            let elapsed = start_time.elapsed().as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "Progress: depth {}, {} pages visited, {} pending, {} items, {:.2} pages/sec",
                self.frontier.depth(),
                self.metrics.pages_visited,
                self.frontier.pending().len(),
                self.metrics.items_collected,
                self.metrics.pages_visited as f64 / elapsed
            );
        };

        let status = match stop {
            StopReason::SeedsUnreachable(ref reason) => {
                tracing::error!("Crawl of {} failed: {}", ctx.collector, reason);
                RunStatus::Failed
            }
            _ => RunStatus::Completed,
        };

        if stop.is_final() {
            if let Err(e) = ctx.checkpoints.delete().await {
                tracing::warn!("Failed to remove checkpoint {}: {}", ctx.checkpoints.path().display(), e);
            }
        }
        self.metrics.finish(status);

        tracing::info!(
            "Crawl of {} finished ({:?}): {} pages, {} items in {:?}",
            ctx.collector,
            stop,
            self.metrics.pages_visited,
            self.metrics.items_collected,
            start_time.elapsed()
        );

        Ok(CrawlOutcome {
            status,
            stop,
            records: self.records,
            metrics: self.metrics,
            frontier: self.frontier,
            resumed: self.resumed,
        })
    }

    /// Fetches a whole batch; `None` when the deadline cut it short
    async fn fetch_batch(&self, batch: &[Url], deadline: Option<Instant>) -> Option<Vec<PageOutcome>> {
        let ctx = self.ctx;
        let work = stream::iter(batch.iter().cloned())
            .map(|url| process_page(ctx, url))
            .buffer_unordered(ctx.concurrency())
            .collect::<Vec<_>>();

        match deadline {
            Some(at) => tokio::time::timeout_at(at, work).await.ok(),
            None => Some(work.await),
        }
    }

    /// Applies a batch's outcomes, returning a stop reason if one arose
    fn commit_batch(&mut self, mut outcomes: Vec<PageOutcome>, first_batch: bool) -> Option<StopReason> {
        // Completion order is arbitrary; commit in URL order
        outcomes.sort_by(|a, b| a.url.cmp(&b.url));

        if first_batch
            && !outcomes.is_empty()
            && outcomes
                .iter()
                .all(|o| matches!(o.result, PageResult::Failed { .. }))
        {
            for outcome in &outcomes {
                self.metrics.absorb(&outcome.stats);
                if let PageResult::Failed { error, .. } = &outcome.result {
                    self.metrics.record_error(format!("{}: {}", outcome.url, error));
                }
            }
            let reason = match outcomes.first().map(|o| &o.result) {
                Some(PageResult::Failed { error, attempts }) => format!(
                    "no seed URL reachable ({} after {} attempt(s))",
                    error, attempts
                ),
                _ => "no seed URL reachable".to_string(),
            };
            return Some(StopReason::SeedsUnreachable(reason));
        }

        let mut fetched = Vec::with_capacity(outcomes.len());
        let mut discovered = Vec::new();
        let mut deferred = Vec::new();
        let mut quota_hit = None;

        for outcome in outcomes {
            self.metrics.absorb(&outcome.stats);
            match outcome.result {
                PageResult::Processed {
                    final_url,
                    classification: _,
                    record,
                    links,
                    extraction_error,
                } => {
                    self.metrics.pages_visited += 1;
                    if let Some(err) = extraction_error {
                        self.metrics.record_error(format!("{}: {}", outcome.url, err));
                    }
                    if let Some(record) = record {
                        if (self.records.len() as u64) < self.frontier.max_items() {
                            self.records.push(record);
                            self.metrics.items_collected += 1;
                        }
                    }
                    discovered.extend(links);
                    // A redirect target is marked under its frontier key
                    if final_url != outcome.url {
                        if let Ok(target) = admit_link(final_url.as_str(), self.frontier.base_domain()) {
                            if target != outcome.url {
                                fetched.push(target);
                            }
                        }
                    }
                    fetched.push(outcome.url);
                }
                PageResult::Failed { error, .. } => {
                    self.metrics.record_error(format!("{}: {}", outcome.url, error));
                    fetched.push(outcome.url);
                }
                PageResult::QuotaExceeded { quota } => {
                    deferred.push(outcome.url);
                    quota_hit = Some(quota);
                }
            }
        }

        let summary = self.frontier.commit(&fetched, &discovered);
        self.frontier.restore_batch(&deferred);
        tracing::debug!(
            "Committed depth {}: {} enqueued, {} known, {} off-domain, {} bad scheme, {} malformed",
            self.frontier.depth(),
            summary.enqueued,
            summary.already_known,
            summary.off_domain,
            summary.bad_scheme,
            summary.malformed
        );

        quota_hit.map(|quota| {
            tracing::warn!(
                "Daily quota of {} exhausted with {} URL(s) still unfetched",
                quota,
                deferred.len()
            );
            StopReason::Fallback(FallbackReason::QuotaExceeded { quota })
        })
    }

    async fn checkpoint(&self) -> Result<()> {
        let checkpoint = Checkpoint::new(
            self.ctx.collector.as_str(),
            self.frontier.clone(),
            self.metrics.clone(),
            self.records.clone(),
        );
        self.ctx.checkpoints.save(&checkpoint).await.map_err(|e| {
            CrawlError::State(format!(
                "cannot write checkpoint {}: {}",
                self.ctx.checkpoints.path().display(),
                e
            ))
        })
    }
}
