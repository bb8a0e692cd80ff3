//! URL handling module
//!
//! This module provides URL normalization, domain extraction and the scope
//! rules the frontier applies to discovered links.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, site_key};
pub use normalize::normalize_url;

use url::Url;

/// Why a discovered link was refused entry to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRejection {
    /// Scheme other than http or https
    Scheme,
    /// Host outside the crawl's base domain
    OffDomain,
    /// Could not be parsed or normalized
    Malformed,
}

/// Returns true for the schemes the crawler is allowed to fetch
pub fn is_fetchable_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Checks whether a URL belongs to the crawl's base domain
///
/// The base domain is a site key as produced by [`site_key`]. Subdomains of
/// the base domain are in scope; sibling or parent domains are not.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use leadcrawl::url::within_base_domain;
///
/// let url = Url::parse("https://gis.brunswick.gov/maps").unwrap();
/// assert!(within_base_domain(&url, "brunswick.gov"));
///
/// let url = Url::parse("https://topsham.gov/maps").unwrap();
/// assert!(!within_base_domain(&url, "brunswick.gov"));
/// ```
pub fn within_base_domain(url: &Url, base_domain: &str) -> bool {
    match site_key(url) {
        Some(key) => key == base_domain || key.ends_with(&format!(".{}", base_domain)),
        None => false,
    }
}

/// Normalizes a raw link and checks it against the crawl scope
///
/// Returns the normalized URL when the link may enter the frontier.
pub fn admit_link(raw: &str, base_domain: &str) -> Result<Url, LinkRejection> {
    let parsed = Url::parse(raw).map_err(|_| LinkRejection::Malformed)?;
    if !is_fetchable_scheme(&parsed) {
        return Err(LinkRejection::Scheme);
    }

    let normalized = normalize_url(raw).map_err(|_| LinkRejection::Malformed)?;
    if !within_base_domain(&normalized, base_domain) {
        return Err(LinkRejection::OffDomain);
    }

    Ok(normalized)
}
