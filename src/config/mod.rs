//! Configuration module for Sumi-Engine
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_engine::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, RobotsConfig, StorageConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{hash_config, load_config, load_config_with_hash, parse_config};

pub(crate) use validation::validate_crawler_config;
