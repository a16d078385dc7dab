//! Crawl statistics
//!
//! This module provides the counters the engine keeps while it runs and a
//! formatted printout of them.

use crate::state::DropReason;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Pages counted against the page budget
    pub pages: u64,

    /// Pages handed to `visit`
    pub visited: u64,

    /// Pages handed to `check`
    pub checked: u64,

    /// Redirect responses turned into a child entry
    pub redirects: u64,

    /// Child entries stored in the frontier
    pub links_enqueued: u64,

    /// Store operations that failed outside of dedup
    pub store_errors: u64,

    /// Dropped entries by reason
    pub drops: BTreeMap<DropReason, u64>,
}

impl CrawlStats {
    /// Number of entries dropped for `reason`
    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops.get(&reason).copied().unwrap_or(0)
    }

    /// Number of entries dropped for any reason
    pub fn total_dropped(&self) -> u64 {
        self.drops.values().sum()
    }
}

/// Shared, lock-protected counters behind [`CrawlStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    inner: Mutex<CrawlStats>,
}

impl StatsRecorder {
    pub(crate) fn update(&self, f: impl FnOnce(&mut CrawlStats)) {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner));
    }

    pub(crate) fn record_drop(&self, reason: DropReason) {
        self.update(|stats| *stats.drops.entry(reason).or_insert(0) += 1);
    }

    pub(crate) fn snapshot(&self) -> CrawlStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStats) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages counted: {}", stats.pages);
    println!("  Pages visited: {}", stats.visited);
    println!("  Pages checked: {}", stats.checked);
    println!("  Redirects followed: {}", stats.redirects);
    println!("  Links enqueued: {}", stats.links_enqueued);
    println!();

    if !stats.drops.is_empty() {
        println!("Dropped Entries ({}):", stats.total_dropped());
        // Sort reasons by count (descending)
        let mut drop_counts: Vec<_> = stats.drops.iter().collect();
        drop_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (reason, count) in drop_counts {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if stats.store_errors > 0 {
        println!("Store errors: {}", stats.store_errors);
        println!();
    }
}
