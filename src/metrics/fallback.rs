use crate::cache::{CacheStore, RequestFingerprint};
use crate::config::FallbackConfig;
use crate::extract::ExtractedRecord;
use crate::fetch::Fetcher;
use crate::metrics::{generate_sample_records, Metrics};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Cache label of the per-collector dataset entry
const DATASET_LABEL: &str = "dataset";

/// Where the records of a collection result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Cached,
    Sample,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Live => "live",
            Self::Cached => "cached",
            Self::Sample => "sample",
        };
        write!(f, "{}", s)
    }
}

/// Why live collection was abandoned
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// The live-collection dependency is unusable
    LiveUnavailable,
    ErrorRatio { ratio: f64, threshold: f64 },
    QuotaExceeded { quota: u64 },
    RunFailed { reason: String },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LiveUnavailable => write!(f, "live collection unavailable"),
            Self::ErrorRatio { ratio, threshold } => write!(
                f,
                "error ratio {:.2} exceeded threshold {:.2}",
                ratio, threshold
            ),
            Self::QuotaExceeded { quota } => write!(f, "daily quota of {} exhausted", quota),
            Self::RunFailed { reason } => write!(f, "run failed: {}", reason),
        }
    }
}

/// Decides when to abandon live collection and what to return instead
#[derive(Debug, Clone)]
pub struct FallbackController {
    threshold: f64,
    min_attempts: u64,
}

impl FallbackController {
    pub fn new(threshold: f64, min_attempts: u64) -> Self {
        Self {
            threshold,
            min_attempts,
        }
    }

    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(config.error_ratio_threshold, config.min_attempts)
    }

    /// Pre-crawl check on the live-collection dependency
    pub async fn check_availability(&self, fetcher: &dyn Fetcher) -> Option<FallbackReason> {
        if fetcher.is_available().await {
            None
        } else {
            Some(FallbackReason::LiveUnavailable)
        }
    }

    /// Post-batch check on the error ratio
    ///
    /// The ratio is only considered once enough attempts have been made for
    /// it to mean something.
    pub fn evaluate(&self, metrics: &Metrics) -> Option<FallbackReason> {
        if metrics.attempts() < self.min_attempts.max(1) {
            return None;
        }
        let ratio = metrics.error_ratio();
        if ratio > self.threshold {
            Some(FallbackReason::ErrorRatio {
                ratio,
                threshold: self.threshold,
            })
        } else {
            None
        }
    }

    /// Produces the degraded dataset
    ///
    /// Preference order: records collected before the failure (checkpointed
    /// progress), then the last successful dataset in the cache, then the
    /// synthetic sample set.
    pub async fn degrade(
        &self,
        collector: &str,
        reason: &FallbackReason,
        partial: Vec<ExtractedRecord>,
        cache: &CacheStore,
    ) -> (Vec<ExtractedRecord>, DataSource) {
        tracing::warn!("Falling back for {}: {}", collector, reason);

        if !partial.is_empty() {
            tracing::info!("Using {} checkpointed record(s)", partial.len());
            return (tag_records(partial, DataSource::Cached), DataSource::Cached);
        }

        match load_dataset(cache).await {
            Some(records) if !records.is_empty() => {
                tracing::info!("Using {} cached record(s) from the last run", records.len());
                (tag_records(records, DataSource::Cached), DataSource::Cached)
            }
            _ => {
                tracing::info!("No cached data for {}, generating sample data", collector);
                (generate_sample_records(collector), DataSource::Sample)
            }
        }
    }
}

fn tag_records(records: Vec<ExtractedRecord>, source: DataSource) -> Vec<ExtractedRecord> {
    records
        .into_iter()
        .map(|r| r.with_metadata("data_source", source.to_string()))
        .collect()
}

fn dataset_fingerprint() -> RequestFingerprint {
    RequestFingerprint::for_label(DATASET_LABEL)
}

/// Stores the result of a successful live collection for later fallback
///
/// The entry is pinned: cache sweeps leave it in place after it expires.
pub async fn save_dataset(
    cache: &CacheStore,
    records: &[ExtractedRecord],
    ttl: Duration,
) -> std::io::Result<()> {
    cache.put_pinned(&dataset_fingerprint(), records, ttl).await
}

/// Last stored dataset, regardless of age
pub async fn load_dataset(cache: &CacheStore) -> Option<Vec<ExtractedRecord>> {
    cache
        .get_stale::<Vec<ExtractedRecord>>(&dataset_fingerprint())
        .await
        .map(|entry| entry.payload)
}
