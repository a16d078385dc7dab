//! Robots.txt handling module
//!
//! [`RobotsMinder`] answers "may this URL be fetched?" for the crawl engine,
//! fetching and compiling each origin's robots.txt on first use and caching
//! the compiled decision.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::{RobotsRuleSet, RobotsRules};

use crate::config::RobotsConfig;
use crate::crawler::{Fetcher, PolitenessThrottle};
use crate::url::CanonicalUrl;
use std::sync::Arc;
use std::time::Duration;

/// Shared robots.txt gatekeeper
///
/// Safe to share across workers and crawls; the cache is independent of any
/// crawl state.
pub struct RobotsMinder {
    user_agent: String,
    fetcher: Arc<dyn Fetcher>,
    cache: RobotsCache,
    /// robots.txt requests wait their turn with page requests to the same host
    politeness: Option<(Arc<PolitenessThrottle>, Duration)>,
}

impl RobotsMinder {
    /// Creates a minder matching robots groups against `user_agent`
    pub fn new(user_agent: impl Into<String>, fetcher: Arc<dyn Fetcher>, config: &RobotsConfig) -> Self {
        Self {
            user_agent: user_agent.into(),
            fetcher,
            cache: RobotsCache::new(config.cache_size, config.expire_after()),
            politeness: None,
        }
    }

    /// Spaces robots.txt fetches through `throttle` like any other request
    pub fn with_politeness(mut self, throttle: Arc<PolitenessThrottle>, delay: Duration) -> Self {
        self.politeness = Some((throttle, delay));
        self
    }

    /// Checks whether robots.txt allows fetching the URL
    ///
    /// The query string is ignored when matching. A robots.txt that cannot be
    /// fetched allows everything, and that decision is cached like any other.
    pub async fn is_safe_to_visit(&self, url: &CanonicalUrl) -> bool {
        if !url.is_crawlable() {
            return false;
        }

        let cell = self.cache.slot(url.origin());
        let rules = cell.get_or_init(|| self.load(url)).await;
        rules.allows(url.path_without_query())
    }

    /// Number of origins with cached decisions
    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }

    async fn load(&self, url: &CanonicalUrl) -> Arc<RobotsRules> {
        if let Some((throttle, delay)) = &self.politeness {
            throttle.wait(url.host(), *delay).await;
        }

        match self.fetcher.fetch_robots_txt(url).await {
            Ok(body) => {
                let rules = RobotsRuleSet::parse(&body).compile(&self.user_agent);
                tracing::debug!("Loaded robots.txt for {}: {:?}", url.origin(), rules);
                Arc::new(rules)
            }
            Err(e) => {
                tracing::debug!(
                    "robots.txt unavailable for {} ({}), allowing all",
                    url.origin(),
                    e
                );
                Arc::new(RobotsRules::AllowAll)
            }
        }
    }
}
