use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::form_urlencoded;
use url::Url;

/// Deterministic identity of a request, used as the cache key
///
/// Computed as a SHA-256 over the uppercased method, the URL without query or
/// fragment, the sorted union of URL query pairs and explicit parameters, and
/// the body. JSON bodies are re-serialized with sorted keys first, so key
/// order never changes the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Fingerprints an HTTP request
    pub fn compute(method: &str, url: &Url, params: &[(String, String)], body: Option<&str>) -> Self {
        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .chain(params.iter().cloned())
            .collect();
        pairs.sort();

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();

        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b"\n");
        hasher.update(base.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(query.as_bytes());
        hasher.update(b"\n");
        if let Some(body) = body {
            hasher.update(canonical_body(body).as_bytes());
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Fingerprint for a named, non-HTTP entry such as a collector's dataset
    pub fn for_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"label\n");
        hasher.update(label.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that a string looks like a fingerprint (64 lowercase hex chars)
    pub fn is_valid(candidate: &str) -> bool {
        candidate.len() == 64
            && candidate
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn canonical_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        // serde_json's default map is ordered by key
        Ok(value) => value.to_string(),
        Err(_) => body.to_string(),
    }
}
