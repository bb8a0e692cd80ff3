//! Response cache
//!
//! Maps a request fingerprint to a previously fetched payload with an expiry.
//! Entries live one-per-file under `<cache_dir>/<collector>/` as JSON and are
//! replaced atomically (write to a temp file, then rename).
//!
//! # Components
//!
//! - `RequestFingerprint`: deterministic identity of a request
//! - `CacheEntry`: a payload plus `cached_at` and `ttl`
//! - `CacheStore`: the directory-backed store

mod fingerprint;
mod store;

pub use fingerprint::RequestFingerprint;
pub use store::{CacheEntry, CacheStore};
