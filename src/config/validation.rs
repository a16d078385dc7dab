use crate::config::types::{Config, CrawlerConfig, RobotsConfig, StorageConfig, UserAgentConfig};
use crate::url::CanonicalUrl;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_robots_config(&config.robots)?;
    validate_storage_config(&config.storage)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates crawler configuration
pub(crate) fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.threads < 1 || config.threads > 256 {
        return Err(ConfigError::Validation(format!(
            "threads must be between 1 and 256, got {}",
            config.threads
        )));
    }

    if config.max_depth < -1 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be -1 (unbounded) or >= 0, got {}",
            config.max_depth
        )));
    }

    if config.total_pages < -1 || config.total_pages == 0 {
        return Err(ConfigError::Validation(format!(
            "total_pages must be -1 (unbounded) or >= 1, got {}",
            config.total_pages
        )));
    }

    if config.empty_queue_wait_time == 0 {
        return Err(ConfigError::Validation(
            "empty_queue_wait_time must be > 0ms".to_string(),
        ));
    }

    if config.queue_shards == Some(0) {
        return Err(ConfigError::Validation(
            "queue_shards must be >= 1 when set".to_string(),
        ));
    }

    if config.max_href_length == 0 {
        return Err(ConfigError::Validation(
            "max_href_length must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.cache_size == 0 {
        return Err(ConfigError::Validation(
            "robots cache_size must be >= 1".to_string(),
        ));
    }

    if config.expire_after == 0 {
        return Err(ConfigError::Validation(
            "robots expire_after must be >= 1s".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if matches!(config.database_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "database_path cannot be empty when set".to_string(),
        ));
    }
    Ok(())
}

/// Seeds must be absolute http(s) URLs
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = CanonicalUrl::parse(seed, None)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if !url.is_crawlable() {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use the http or https scheme",
                seed
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid email format: '{}'", email)))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
