//! Reading configuration files
//!
//! A file is read once; the same bytes are parsed and hashed so the hash
//! logged at startup always describes the configuration actually in use.

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration text
///
/// # Example
///
/// ```
/// use sumi_engine::config::parse_config;
///
/// let config = parse_config(r#"
/// seeds = ["https://example.com/"]
///
/// [crawler]
/// threads = 4
///
/// [user-agent]
/// crawler-name = "ExampleBot"
/// crawler-version = "1.0"
/// contact-url = "https://example.com/bot"
/// contact-email = "bot@example.com"
/// "#).unwrap();
/// assert_eq!(config.crawler.threads, 4);
/// ```
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of configuration text, used to tell runs apart
pub fn hash_config(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads and validates the TOML configuration at `path`
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to read, parse, or validate the file
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Loads a configuration together with the hash of the text it came from
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_config(&content)))
}
