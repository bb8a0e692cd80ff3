use crate::config::Config;
use crate::crawler::{Coordinator, CrawlContext, StopReason};
use crate::extract::{ExtractedRecord, ExtractorRegistry};
use crate::fetch::Fetcher;
use crate::metrics::{
    save_dataset, write_sidecar, DataSource, FallbackReason, Metrics, MetricsReport, RunStatus,
};
use crate::{CrawlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Provenance and bookkeeping attached to every collection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub collector: String,
    pub source: DataSource,
    pub using_sample_data: bool,
    /// The records cover only part of the site
    pub partial: bool,
    pub collected_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Why live data was not served, if it wasn't
    pub error: Option<String>,
    pub metrics: Metrics,
}

/// What a collector hands to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub records: Vec<ExtractedRecord>,
    pub metadata: CollectionMetadata,
}

impl CollectionResult {
    pub fn is_live(&self) -> bool {
        self.metadata.source == DataSource::Live
    }
}

/// One configured collector: crawl a site, or degrade to cached or sample data
#[derive(Debug)]
pub struct Collector {
    context: CrawlContext,
    fresh: bool,
}

impl Collector {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            context: CrawlContext::from_config(config)?,
            fresh: false,
        })
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Ok(Self {
            context: CrawlContext::with_fetcher(config, fetcher)?,
            fresh: false,
        })
    }

    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.context = self.context.with_registry(registry);
        self
    }

    /// Ignore any checkpoint and start from the seeds
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn context(&self) -> &CrawlContext {
        &self.context
    }

    /// Runs the collector
    ///
    /// Live-collection problems never surface as `Err`: they produce a
    /// degraded result whose metadata says where the records came from.
    /// `Err` means the run could not be set up or its state not persisted.
    pub async fn collect(&self) -> Result<CollectionResult> {
        let ctx = &self.context;
        tracing::info!("Starting collection for {}", ctx.collector);

        if let Some(reason) = ctx.fallback.check_availability(ctx.fetcher.as_ref()).await {
            let mut metrics = Metrics::new();
            metrics.record_error(reason.to_string());
            return self.degraded(reason, Vec::new(), metrics).await;
        }

        let outcome = Coordinator::restore(ctx, self.fresh).await.run().await?;

        if let Some(reason) = outcome.fallback_reason() {
            return self.degraded(reason, outcome.records, outcome.metrics).await;
        }

        if !outcome.records.is_empty() {
            if let Err(e) = save_dataset(&ctx.cache, &outcome.records, ctx.cache_ttl).await {
                tracing::warn!("Failed to store dataset for {}: {}", ctx.collector, e);
            }
        }

        let partial = outcome.stop == StopReason::Deadline;
        let records = outcome
            .records
            .into_iter()
            .map(|r| r.with_metadata("data_source", DataSource::Live.to_string()))
            .collect();

        self.finish(records, DataSource::Live, partial, None, outcome.metrics)
            .await
    }

    async fn degraded(
        &self,
        reason: FallbackReason,
        partial_records: Vec<ExtractedRecord>,
        metrics: Metrics,
    ) -> Result<CollectionResult> {
        let ctx = &self.context;
        let has_partial = !partial_records.is_empty();
        let (records, source) = ctx
            .fallback
            .degrade(&ctx.collector, &reason, partial_records, &ctx.cache)
            .await;

        self.finish(records, source, has_partial, Some(reason.to_string()), metrics)
            .await
    }

    async fn finish(
        &self,
        records: Vec<ExtractedRecord>,
        source: DataSource,
        partial: bool,
        error: Option<String>,
        metrics: Metrics,
    ) -> Result<CollectionResult> {
        let ctx = &self.context;
        let using_sample_data = source == DataSource::Sample;

        let report = MetricsReport {
            collector: ctx.collector.clone(),
            source,
            using_sample_data,
            fallback_reason: error.clone(),
            metrics: metrics.clone(),
            written_at: Utc::now(),
        };
        write_sidecar(&ctx.sidecar, &report).await.map_err(|e| {
            CrawlError::State(format!(
                "cannot write metrics sidecar {}: {}",
                ctx.sidecar.display(),
                e
            ))
        })?;

        tracing::info!(
            "Collection for {} finished: {} record(s) from {} data (status {})",
            ctx.collector,
            records.len(),
            source,
            metrics.status
        );

        Ok(CollectionResult {
            records,
            metadata: CollectionMetadata {
                collector: ctx.collector.clone(),
                source,
                using_sample_data,
                partial,
                collected_at: Utc::now(),
                status: metrics.status,
                error,
                metrics,
            },
        })
    }
}
