use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use leadcrawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Builds the site key used as a crawl's base domain
///
/// The key is the lowercase host without a leading `www.`, followed by
/// `:port` when the URL carries a non-default port. `www.town.gov` and
/// `town.gov` are one site; two servers on the same host but different ports
/// are not.
pub fn site_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    let host = match host.strip_prefix("www.") {
        Some(bare) if !bare.is_empty() => bare.to_string(),
        _ => host,
    };
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_subdomain() {
        let url = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_site_key_default_port() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(site_key(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_site_key_folds_www() {
        let url = Url::parse("https://www.brunswickme.org/assessing").unwrap();
        assert_eq!(site_key(&url), Some("brunswickme.org".to_string()));
        assert_eq!(extract_domain(&url), Some("www.brunswickme.org".to_string()));
    }

    #[test]
    fn test_site_key_explicit_port() {
        let url = Url::parse("http://127.0.0.1:4321/a").unwrap();
        assert_eq!(site_key(&url), Some("127.0.0.1:4321".to_string()));
    }
}
