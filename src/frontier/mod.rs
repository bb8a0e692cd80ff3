//! BFS crawl frontier
//!
//! This module handles:
//! - The visited/pending sets of one crawl and their invariants
//! - Taking a whole BFS level as a batch and committing its results
//! - Durable checkpoints of the frontier, metrics and records

mod checkpoint;

pub use checkpoint::{checkpoint_path, Checkpoint, CheckpointStore, CHECKPOINT_VERSION};

use crate::url::{admit_link, LinkRejection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;

/// Counts of what happened to the links offered in a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub enqueued: usize,
    pub already_known: usize,
    pub off_domain: usize,
    pub bad_scheme: usize,
    pub malformed: usize,
}

/// Crawl progress: what has been fetched and what is waiting
///
/// A URL is in at most one of `visited` and `pending`. Ordered sets keep
/// checkpoints byte-stable for identical progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierState {
    visited: BTreeSet<String>,
    pending: BTreeSet<String>,
    base_domain: String,
    depth: u32,
    max_depth: u32,
    max_items: u64,
}

impl FrontierState {
    /// Starts a fresh frontier from seed URLs
    ///
    /// Seeds are admitted with the same rules as discovered links.
    pub fn new(seeds: &[Url], base_domain: impl Into<String>, max_depth: u32, max_items: u64) -> Self {
        let mut state = Self {
            visited: BTreeSet::new(),
            pending: BTreeSet::new(),
            base_domain: base_domain.into(),
            depth: 0,
            max_depth,
            max_items,
        };
        for seed in seeds {
            match admit_link(seed.as_str(), &state.base_domain) {
                Ok(url) => {
                    state.pending.insert(url.to_string());
                }
                Err(reason) => tracing::warn!("Seed {} rejected: {:?}", seed, reason),
            }
        }
        state
    }

    pub fn visited(&self) -> &BTreeSet<String> {
        &self.visited
    }

    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// BFS levels committed so far
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_items(&self) -> u64 {
        self.max_items
    }

    /// Applies bounds from the current configuration to a restored frontier
    pub fn with_limits(mut self, max_depth: u32, max_items: u64) -> Self {
        self.max_depth = max_depth;
        self.max_items = max_items;
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn depth_reached(&self) -> bool {
        self.depth >= self.max_depth
    }

    pub fn items_reached(&self, items_collected: u64) -> bool {
        items_collected >= self.max_items
    }

    /// Whether another batch should be processed
    pub fn has_next_batch(&self, items_collected: u64) -> bool {
        !self.is_exhausted() && !self.depth_reached() && !self.items_reached(items_collected)
    }

    /// Takes the whole pending set as the next BFS level
    ///
    /// Entries that no longer parse are dropped with a warning.
    pub fn take_batch(&mut self) -> Vec<Url> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|raw| match Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!("Dropping unparsable frontier entry {}: {}", raw, e);
                    None
                }
            })
            .collect()
    }

    /// Puts an uncommitted batch back in front of the crawl
    pub fn restore_batch(&mut self, batch: &[Url]) {
        for url in batch {
            if !self.visited.contains(url.as_str()) {
                self.pending.insert(url.to_string());
            }
        }
    }

    /// Commits a processed batch
    ///
    /// Marks `fetched` as visited, admits the discovered links that are in
    /// scope and unseen into `pending`, and counts one BFS level.
    pub fn commit<'a, F, L>(&mut self, fetched: F, discovered: L) -> CommitSummary
    where
        F: IntoIterator<Item = &'a Url>,
        L: IntoIterator<Item = &'a Url>,
    {
        for url in fetched {
            let key = url.to_string();
            self.pending.remove(&key);
            self.visited.insert(key);
        }

        let mut summary = CommitSummary::default();
        for link in discovered {
            match admit_link(link.as_str(), &self.base_domain) {
                Ok(url) => {
                    let key = url.to_string();
                    if self.visited.contains(&key) || !self.pending.insert(key) {
                        summary.already_known += 1;
                    } else {
                        summary.enqueued += 1;
                    }
                }
                Err(LinkRejection::OffDomain) => summary.off_domain += 1,
                Err(LinkRejection::Scheme) => summary.bad_scheme += 1,
                Err(LinkRejection::Malformed) => summary.malformed += 1,
            }
        }

        self.depth += 1;
        summary
    }
}
