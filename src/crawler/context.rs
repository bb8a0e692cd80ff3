use crate::cache::CacheStore;
use crate::config::Config;
use crate::extract::ExtractorRegistry;
use crate::fetch::{Fetcher, ReqwestFetcher, RetryPolicy};
use crate::frontier::CheckpointStore;
use crate::limiter::RateLimiter;
use crate::metrics::{sidecar_path, FallbackController};
use crate::url::{normalize_url, site_key};
use crate::{CrawlError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything one collector run needs, passed explicitly to each stage
pub struct CrawlContext {
    pub collector: String,
    pub config: Config,
    pub seeds: Vec<Url>,
    /// Site key all crawled URLs must fall under
    pub base_domain: String,
    pub fetcher: Arc<dyn Fetcher>,
    pub cache: CacheStore,
    pub limiter: RateLimiter,
    pub retry: RetryPolicy,
    pub registry: ExtractorRegistry,
    pub checkpoints: CheckpointStore,
    pub fallback: FallbackController,
    pub cache_ttl: Duration,
    pub sidecar: PathBuf,
}

impl CrawlContext {
    /// Builds a context with the reqwest-backed fetcher
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = ReqwestFetcher::from_config(&config.user_agent, config.crawler.request_timeout())?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Builds a context around a caller-supplied fetcher
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let collector = config.collector.name.clone();

        let seeds = config
            .collector
            .seeds
            .iter()
            .map(|seed| normalize_url(seed))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let base_domain = seeds
            .first()
            .and_then(site_key)
            .ok_or_else(|| CrawlError::FatalSeed {
                reason: "no usable seed URL".to_string(),
            })?;

        let state_dir = &config.output.state_dir;
        std::fs::create_dir_all(state_dir).map_err(|e| {
            CrawlError::State(format!("cannot create {}: {}", state_dir.display(), e))
        })?;

        let cache = if config.cache.enabled {
            CacheStore::open(&config.cache.dir, &collector)?
        } else {
            CacheStore::disabled()
        };

        Ok(Self {
            checkpoints: CheckpointStore::for_collector(state_dir, &collector),
            sidecar: sidecar_path(state_dir, &collector),
            limiter: RateLimiter::from_config(&config.rate_limit),
            retry: RetryPolicy::from_config(&config.retry),
            fallback: FallbackController::from_config(&config.fallback),
            cache_ttl: config.cache.ttl(),
            registry: ExtractorRegistry::with_defaults(),
            collector,
            seeds,
            base_domain,
            fetcher,
            cache,
            config,
        })
    }

    /// Replaces the extractor registry
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.config.crawler.deadline()
    }

    pub fn concurrency(&self) -> usize {
        self.config.crawler.concurrency.max(1)
    }
}

impl std::fmt::Debug for CrawlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlContext")
            .field("collector", &self.collector)
            .field("base_domain", &self.base_domain)
            .field("seeds", &self.seeds)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
