//! Output module for crawl summaries
//!
//! This module handles:
//! - Recording crawl statistics while the engine runs
//! - Printing them once a crawl ends

pub mod stats;

pub use stats::{print_statistics, CrawlStats};
pub(crate) use stats::StatsRecorder;
