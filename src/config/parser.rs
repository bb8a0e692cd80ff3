use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that a resumed run can be matched to the
/// configuration that produced its checkpoint.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[collector]
name = "brunswick-taxmaps"
seeds = ["https://www.brunswickme.org/assessing"]

[crawler]
max-depth = 3
max-items = 250
concurrency = 8
request-timeout-secs = 20
deadline-secs = 600

[retry]
max-retries = 4
backoff-factor = 1.5
jitter = false

[rate-limit]
min-delay-ms = 2000
max-delay-ms = 4000
daily-quota = 5000

[cache]
dir = "/var/cache/leadcrawl"
ttl-secs = 3600

[fallback]
error-ratio-threshold = 0.35
min-attempts = 10

[output]
state-dir = "/var/lib/leadcrawl"

[user-agent]
name = "LeadCrawl"
version = "2.1"
contact-url = "https://example.com/about"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.collector.name, "brunswick-taxmaps");
        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.max_items, 250);
        assert_eq!(config.crawler.concurrency, 8);
        assert_eq!(config.crawler.deadline(), Some(Duration::from_secs(600)));
        assert_eq!(config.retry.max_retries, 4);
        assert!(!config.retry.jitter);
        assert_eq!(
            config.rate_limit.delay_range(),
            (Duration::from_secs(2), Duration::from_secs(4))
        );
        assert_eq!(config.rate_limit.daily_quota, Some(5000));
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.fallback.min_attempts, 10);
        assert_eq!(
            config.user_agent.header_value(),
            "LeadCrawl/2.1 (+https://example.com/about)"
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[collector]
name = "topsham"
seeds = ["https://topsham.gov/"]
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_depth, 5);
        assert_eq!(config.crawler.concurrency, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff_factor, 0.5);
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert_eq!(config.fallback.error_ratio_threshold, 0.2);
        assert_eq!(config.rate_limit.daily_quota, None);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[collector]
name = "topsham"
seeds = ["https://topsham.gov/"]

[crawler]
concurrency = 0
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
