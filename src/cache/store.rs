//! Directory-backed cache store
//!
//! One JSON file per fingerprint. Reads never fail: a missing, expired or
//! unreadable entry is a miss and collection proceeds as if the cache were
//! cold.

use crate::cache::RequestFingerprint;
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Distinguishes concurrent temp files written by this process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cached payload with its freshness window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub fingerprint: RequestFingerprint,
    pub payload: T,
    pub cached_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// Survives `sweep` once expired; only `clear` or an overwrite removes it
    #[serde(default)]
    pub pinned: bool,
}

impl<T> CacheEntry<T> {
    pub fn new(fingerprint: RequestFingerprint, payload: T, ttl: Duration) -> Self {
        Self {
            fingerprint,
            payload,
            cached_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
            pinned: false,
        }
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// Valid iff `now - cached_at < ttl`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64);
        now - self.cached_at < ttl
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// Age of the entry
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.cached_at
    }
}

/// Directory-backed cache store
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    enabled: bool,
}

impl CacheStore {
    /// Opens (creating if needed) the cache namespace `<root>/<namespace>`
    pub fn open(root: &Path, namespace: &str) -> io::Result<Self> {
        let dir = root.join(namespace);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, enabled: true })
    }

    /// A store that never hits and never writes
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding an entry
    pub fn entry_path(&self, fingerprint: &RequestFingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint.as_str()))
    }

    /// Looks up a fresh entry
    ///
    /// Returns `None` for a missing, expired or corrupt entry. Expired
    /// entries stay on disk until overwritten or swept.
    pub async fn get<T: DeserializeOwned>(
        &self,
        fingerprint: &RequestFingerprint,
    ) -> Option<CacheEntry<T>> {
        let entry = self.read_entry::<T>(fingerprint).await?;
        if entry.is_fresh() {
            Some(entry)
        } else {
            tracing::debug!("Cache entry {} expired", fingerprint);
            None
        }
    }

    /// Looks up an entry regardless of its age
    ///
    /// Used by the fallback path, where stale data beats synthetic data.
    pub async fn get_stale<T: DeserializeOwned>(
        &self,
        fingerprint: &RequestFingerprint,
    ) -> Option<CacheEntry<T>> {
        self.read_entry(fingerprint).await
    }

    /// Stores a payload, replacing any previous entry for the fingerprint
    pub async fn put<T: Serialize>(
        &self,
        fingerprint: &RequestFingerprint,
        payload: T,
        ttl: Duration,
    ) -> io::Result<()> {
        let entry = CacheEntry::new(fingerprint.clone(), payload, ttl);
        self.write_entry(&entry).await
    }

    /// Stores a payload that expires like any other but is never swept
    pub async fn put_pinned<T: Serialize>(
        &self,
        fingerprint: &RequestFingerprint,
        payload: T,
        ttl: Duration,
    ) -> io::Result<()> {
        let entry = CacheEntry::new(fingerprint.clone(), payload, ttl).pinned();
        self.write_entry(&entry).await
    }

    /// Writes a complete entry atomically
    pub async fn write_entry<T: Serialize>(&self, entry: &CacheEntry<T>) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let bytes = serde_json::to_vec(entry).map_err(io::Error::other)?;
        let target = self.entry_path(&entry.fingerprint);
        let temp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            entry.fingerprint.as_str(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&temp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        tracing::trace!("Cached {} ({} bytes)", entry.fingerprint, bytes.len());
        Ok(())
    }

    /// Removes expired, corrupt and orphaned temp entries
    ///
    /// Pinned entries are kept whatever their age.
    ///
    /// # Returns
    ///
    /// The number of files removed
    pub async fn sweep(&self) -> io::Result<usize> {
        self.remove_matching(|entry| match entry {
            Some(entry) => !entry.pinned && !entry.is_fresh(),
            None => true,
        })
        .await
    }

    /// Removes every entry
    pub async fn clear(&self) -> io::Result<usize> {
        let removed = self.remove_matching(|_| true).await?;
        tracing::info!("Cleared {} cache entries from {}", removed, self.dir.display());
        Ok(removed)
    }

    async fn read_entry<T: DeserializeOwned>(
        &self,
        fingerprint: &RequestFingerprint,
    ) -> Option<CacheEntry<T>> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
            Ok(entry) if entry.fingerprint == *fingerprint => Some(entry),
            Ok(_) => {
                tracing::warn!(
                    "Cache entry {} holds a different fingerprint, treating as miss",
                    path.display()
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Corrupt cache entry {}, treating as miss: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    async fn remove_matching<F>(&self, should_remove: F) -> io::Result<usize>
    where
        F: Fn(Option<&CacheEntry<IgnoredAny>>) -> bool,
    {
        if !self.enabled {
            return Ok(0);
        }

        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let name = item.file_name().to_string_lossy().into_owned();

            let remove = if name.ends_with(".tmp") {
                true
            } else if name.ends_with(".json") {
                let parsed = tokio::fs::read(&path)
                    .await
                    .ok()
                    .and_then(|bytes| serde_json::from_slice::<CacheEntry<IgnoredAny>>(&bytes).ok());
                should_remove(parsed.as_ref())
            } else {
                false
            };

            if remove {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fp(label: &str) -> RequestFingerprint {
        RequestFingerprint::for_label(label)
    }

    fn open_store() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path(), "vgsi").unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_dir, store) = open_store();
        store
            .put(&fp("a"), "payload".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let entry = store.get::<String>(&fp("a")).await.unwrap();
        assert_eq!(entry.payload, "payload");
        assert_eq!(entry.ttl_secs, 60);
    }

    #[tokio::test]
    async fn test_missing_is_miss() {
        let (_dir, store) = open_store();
        assert!(store.get::<String>(&fp("absent")).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_but_kept() {
        let (_dir, store) = open_store();
        let ttl = Duration::from_secs(60);
        let mut entry = CacheEntry::new(fp("old"), "stale".to_string(), ttl);
        entry.cached_at = Utc::now() - chrono::Duration::seconds(61);
        store.write_entry(&entry).await.unwrap();

        assert!(store.get::<String>(&fp("old")).await.is_none());
        assert!(store.entry_path(&fp("old")).exists());

        let stale = store.get_stale::<String>(&fp("old")).await.unwrap();
        assert_eq!(stale.payload, "stale");
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let mut entry = CacheEntry::new(fp("edge"), (), Duration::from_secs(100));

        entry.cached_at = now - chrono::Duration::seconds(99);
        assert!(entry.is_fresh_at(now));

        entry.cached_at = now - chrono::Duration::seconds(100);
        assert!(!entry.is_fresh_at(now));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let (_dir, store) = open_store();
        std::fs::write(store.entry_path(&fp("bad")), b"{ not json").unwrap();

        assert!(store.get::<String>(&fp("bad")).await.is_none());
    }

    #[tokio::test]
    async fn test_wrong_payload_type_is_miss() {
        let (_dir, store) = open_store();
        store
            .put(&fp("n"), 42u32, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.get::<Vec<String>>(&fp("n")).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_dir, store) = open_store();
        let ttl = Duration::from_secs(60);
        store.put(&fp("k"), 1u32, ttl).await.unwrap();
        store.put(&fp("k"), 2u32, ttl).await.unwrap();

        assert_eq!(store.get::<u32>(&fp("k")).await.unwrap().payload, 2);
    }

    #[tokio::test]
    async fn test_concurrent_puts_leave_one_whole_entry() {
        let (_dir, store) = open_store();
        let ttl = Duration::from_secs(60);
        let big_a = "a".repeat(64 * 1024);
        let big_b = "b".repeat(64 * 1024);

        let race = fp("race");
        let (ra, rb) = tokio::join!(
            store.put(&race, big_a.clone(), ttl),
            store.put(&race, big_b.clone(), ttl)
        );
        ra.unwrap();
        rb.unwrap();

        let payload = store.get::<String>(&race).await.unwrap().payload;
        assert!(payload == big_a || payload == big_b);

        let leftovers = std::fs::read_dir(store.dir())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_and_corrupt() {
        let (_dir, store) = open_store();
        let ttl = Duration::from_secs(60);
        store.put(&fp("fresh"), 1u32, ttl).await.unwrap();

        let mut old = CacheEntry::new(fp("old"), 2u32, ttl);
        old.cached_at = Utc::now() - chrono::Duration::seconds(120);
        store.write_entry(&old).await.unwrap();

        std::fs::write(store.entry_path(&fp("bad")), b"garbage").unwrap();

        assert_eq!(store.sweep().await.unwrap(), 2);
        assert!(store.get::<u32>(&fp("fresh")).await.is_some());
        assert!(!store.entry_path(&fp("old")).exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_pinned_entries() {
        let (_dir, store) = open_store();
        let ttl = Duration::from_secs(60);

        let mut kept = CacheEntry::new(fp("dataset"), vec![1u32, 2], ttl).pinned();
        kept.cached_at = Utc::now() - chrono::Duration::seconds(3600);
        store.write_entry(&kept).await.unwrap();

        let mut old = CacheEntry::new(fp("old"), 2u32, ttl);
        old.cached_at = Utc::now() - chrono::Duration::seconds(3600);
        store.write_entry(&old).await.unwrap();

        assert_eq!(store.sweep().await.unwrap(), 1);
        assert!(store.get::<Vec<u32>>(&fp("dataset")).await.is_none());
        let stale = store.get_stale::<Vec<u32>>(&fp("dataset")).await.unwrap();
        assert!(stale.pinned);
        assert_eq!(stale.payload, vec![1, 2]);

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(!store.entry_path(&fp("dataset")).exists());
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, store) = open_store();
        let ttl = Duration::from_secs(60);
        store.put(&fp("a"), 1u32, ttl).await.unwrap();
        store.put(&fp("b"), 2u32, ttl).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.get::<u32>(&fp("a")).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_store() {
        let store = CacheStore::disabled();
        store
            .put(&fp("a"), 1u32, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.get::<u32>(&fp("a")).await.is_none());
        assert_eq!(store.sweep().await.unwrap(), 0);
    }
}
