use crate::config::types::{
    CacheConfig, CollectorConfig, Config, CrawlerConfig, FallbackConfig, RateLimitConfig,
    RetryConfig,
};
use crate::url::{normalize_url, site_key};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_collector_config(&config.collector)?;
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_cache_config(&config.cache)?;
    validate_fallback_config(&config.fallback)?;
    Ok(())
}

/// Validates the collector identity and seeds
///
/// Seeds must be http(s) URLs sharing one base domain, since a crawl run owns
/// exactly one frontier.
fn validate_collector_config(config: &CollectorConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "collector name cannot be empty".to_string(),
        ));
    }

    // Used as a file name component
    if !config
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "collector name must contain only ASCII alphanumerics, '-' or '_', got '{}'",
            config.name
        )));
    }

    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(format!(
            "collector '{}' must have at least one seed URL",
            config.name
        )));
    }

    let mut base: Option<String> = None;
    for seed in &config.seeds {
        let url = normalize_url(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
        let key = site_key(&url)
            .ok_or_else(|| ConfigError::InvalidUrl(format!("Seed URL '{}' has no host", seed)))?;

        match &base {
            None => base = Some(key),
            Some(existing) if *existing != key => {
                return Err(ConfigError::Validation(format!(
                    "all seeds must share one base domain, found '{}' and '{}'",
                    existing, key
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth < 1 {
        return Err(ConfigError::Validation(
            "max_depth must be >= 1".to_string(),
        ));
    }

    if config.max_items < 1 {
        return Err(ConfigError::Validation(
            "max_items must be >= 1".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "deadline_secs must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 || config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 10, got {}",
            config.max_retries
        )));
    }

    if !config.backoff_factor.is_finite() || config.backoff_factor < 0.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_factor must be a non-negative number, got {}",
            config.backoff_factor
        )));
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "rate limit min_delay_ms ({}) exceeds max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.daily_quota == Some(0) {
        return Err(ConfigError::Validation(
            "daily_quota must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.enabled && config.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "cache ttl_secs must be > 0 when the cache is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_fallback_config(config: &FallbackConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.error_ratio_threshold) {
        return Err(ConfigError::Validation(format!(
            "error_ratio_threshold must be within [0, 1], got {}",
            config.error_ratio_threshold
        )));
    }

    Ok(())
}
