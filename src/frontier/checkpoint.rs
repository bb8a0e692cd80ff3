use crate::extract::ExtractedRecord;
use crate::frontier::FrontierState;
use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Schema version written into every checkpoint
pub const CHECKPOINT_VERSION: u32 = 1;

/// Durable snapshot of a crawl in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub collector: String,
    pub frontier: FrontierState,
    pub metrics: Metrics,
    /// Records collected so far, so a resumed run returns the whole dataset
    #[serde(default)]
    pub records: Vec<ExtractedRecord>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        collector: impl Into<String>,
        frontier: FrontierState,
        metrics: Metrics,
        records: Vec<ExtractedRecord>,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            collector: collector.into(),
            frontier,
            metrics,
            records,
            saved_at: Utc::now(),
        }
    }
}

/// Location of a collector's checkpoint file
pub fn checkpoint_path(state_dir: &Path, collector: &str) -> PathBuf {
    state_dir.join(format!("{}.checkpoint.json", collector))
}

/// Reads and writes one collector's checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_collector(state_dir: &Path, collector: &str) -> Self {
        Self::new(checkpoint_path(state_dir, collector))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Loads the checkpoint if there is a usable one
    ///
    /// An unreadable file, a parse failure or an unknown schema version all
    /// count as "no checkpoint". Since that silently discards earlier progress
    /// it is logged at error level.
    pub async fn load(&self) -> Option<Checkpoint> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::error!("Checkpoint {} unreadable, starting fresh: {}", self.path.display(), e);
                return None;
            }
        };

        let checkpoint: Checkpoint = match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::error!("Checkpoint {} corrupt, starting fresh: {}", self.path.display(), e);
                return None;
            }
        };

        if checkpoint.version != CHECKPOINT_VERSION {
            tracing::error!(
                "Checkpoint {} has schema version {} (expected {}), starting fresh",
                self.path.display(),
                checkpoint.version,
                CHECKPOINT_VERSION
            );
            return None;
        }

        Some(checkpoint)
    }

    /// Writes the checkpoint atomically (temp file + rename)
    pub async fn save(&self, checkpoint: &Checkpoint) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        tokio::fs::write(&tmp, &json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Removes the checkpoint; a missing file is not an error
    pub async fn delete(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
