//! Run metrics and graceful degradation
//!
//! This module contains:
//! - Per-run counters and the run status
//! - The metrics sidecar written at the end of each run
//! - The fallback controller deciding when live collection is abandoned
//! - The deterministic sample-data generator

mod fallback;
mod sample;

pub use fallback::{load_dataset, save_dataset, DataSource, FallbackController, FallbackReason};
pub use sample::{generate_sample_records, SAMPLE_RECORD_COUNT};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Most recent error messages kept in `Metrics::errors`
pub const MAX_RECORDED_ERRORS: usize = 50;

/// Lifecycle of a collector run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Counters produced by fetching one URL, folded into `Metrics` by the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub retries: u64,
    pub failures: u64,
}

impl FetchStats {
    pub fn merge(&mut self, other: &FetchStats) {
        self.requests += other.requests;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
        self.retries += other.retries;
        self.failures += other.failures;
    }
}

/// Counters scoped to one collector run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Outbound requests made; retries of one request are counted in `retries`
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub retries: u64,
    /// Requests that failed after their retry budget
    pub failures: u64,
    pub items_collected: u64,
    #[serde(default)]
    pub pages_visited: u64,
    pub status: RunStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Most recent error messages, oldest first
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests: 0,
            cache_hits: 0,
            cache_misses: 0,
            retries: 0,
            failures: 0,
            items_collected: 0,
            pages_visited: 0,
            status: RunStatus::NotStarted,
            started_at: None,
            finished_at: None,
            errors: Vec::new(),
        }
    }

    /// Marks the run as in progress, keeping counters restored from a checkpoint
    pub fn start(&mut self) {
        self.status = RunStatus::InProgress;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.finished_at = None;
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn absorb(&mut self, stats: &FetchStats) {
        self.requests += stats.requests;
        self.cache_hits += stats.cache_hits;
        self.cache_misses += stats.cache_misses;
        self.retries += stats.retries;
        self.failures += stats.failures;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        if self.errors.len() > MAX_RECORDED_ERRORS {
            let excess = self.errors.len() - MAX_RECORDED_ERRORS;
            self.errors.drain(..excess);
        }
    }

    /// Requests plus cache hits: every URL resolution the run attempted
    pub fn attempts(&self) -> u64 {
        self.requests + self.cache_hits
    }

    pub fn error_ratio(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            attempts => self.failures as f64 / attempts as f64,
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Contents of the metrics sidecar file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub collector: String,
    pub source: DataSource,
    pub using_sample_data: bool,
    #[serde(default)]
    pub fallback_reason: Option<String>,
    pub metrics: Metrics,
    pub written_at: DateTime<Utc>,
}

/// Location of a collector's metrics sidecar
pub fn sidecar_path(state_dir: &Path, collector: &str) -> PathBuf {
    state_dir.join(format!("{}.metrics.json", collector))
}

/// Writes the sidecar atomically
pub async fn write_sidecar(path: &Path, report: &MetricsReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(report)?;
    let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

pub async fn read_sidecar(path: &Path) -> std::io::Result<MetricsReport> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Prints a sidecar report to stdout in a formatted manner
pub fn print_report(report: &MetricsReport) {
    let m = &report.metrics;

    println!("=== Collector Run: {} ===\n", report.collector);

    println!("Outcome:");
    println!("  Status: {}", m.status);
    println!("  Data source: {}", report.source);
    if report.using_sample_data {
        println!("  Using sample data: yes");
    }
    if let Some(reason) = &report.fallback_reason {
        println!("  Fallback reason: {}", reason);
    }
    if let Some(duration) = m.duration() {
        println!("  Duration: {}s", duration.num_seconds());
    }
    println!();

    println!("Counters:");
    println!("  Pages visited: {}", m.pages_visited);
    println!("  Items collected: {}", m.items_collected);
    println!("  Requests: {}", m.requests);
    println!("  Retries: {}", m.retries);
    println!("  Failures: {}", m.failures);

    let lookups = m.cache_hits + m.cache_misses;
    let hit_rate = if lookups > 0 {
        (m.cache_hits as f64 / lookups as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  Cache: {} hits / {} misses ({:.1}% hit rate)",
        m.cache_hits, m.cache_misses, hit_rate
    );
    println!("  Error ratio: {:.1}%", m.error_ratio() * 100.0);
    println!();

    if !m.errors.is_empty() {
        println!("Recent Errors ({}):", m.errors.len());
        for error in m.errors.iter().rev().take(10) {
            println!("  - {}", error);
        }
        println!();
    }
}
