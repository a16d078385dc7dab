use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Engine
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// URLs the crawl starts from
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub threads: usize,

    /// Entries at or beyond this depth are dropped (-1 = unbounded)
    #[serde(rename = "max-depth")]
    pub max_depth: i32,

    /// Stop after this many visited pages (-1 = unbounded)
    #[serde(rename = "total-pages")]
    pub total_pages: i64,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "politeness-delay")]
    pub politeness_delay: u64,

    /// How long a worker waits on empty queues before giving up (milliseconds)
    #[serde(rename = "empty-queue-wait-time")]
    pub empty_queue_wait_time: u64,

    #[serde(rename = "respect-robots-txt")]
    pub respect_robots_txt: bool,

    /// Enqueue the Location target of 3xx responses
    #[serde(rename = "follow-redirects")]
    pub follow_redirects: bool,

    /// Maximum entries per frontier shard (0 = unbounded)
    #[serde(rename = "max-queue-size")]
    pub max_queue_size: usize,

    /// Number of frontier shards (defaults to the worker count)
    #[serde(rename = "queue-shards")]
    pub queue_shards: Option<usize>,

    /// Anchor hrefs longer than this are ignored
    #[serde(rename = "max-href-length")]
    pub max_href_length: usize,

    /// Stop once every worker finds the queues empty
    #[serde(rename = "shutdown-on-empty-queue")]
    pub shutdown_on_empty_queue: bool,
}

impl CrawlerConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay)
    }

    pub fn empty_queue_wait_time(&self) -> Duration {
        Duration::from_millis(self.empty_queue_wait_time)
    }

    /// Number of frontier shards to create
    pub fn shard_count(&self) -> usize {
        self.queue_shards.unwrap_or(self.threads).max(1)
    }

    /// The page quota, if bounded
    pub fn page_quota(&self) -> Option<u64> {
        u64::try_from(self.total_pages).ok()
    }

    /// The depth bound, if any
    pub fn depth_limit(&self) -> Option<u32> {
        u32::try_from(self.max_depth).ok()
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            max_depth: -1,
            total_pages: -1,
            politeness_delay: 200,
            empty_queue_wait_time: 10_000,
            respect_robots_txt: true,
            follow_redirects: true,
            max_queue_size: 0,
            queue_shards: None,
            max_href_length: 2048,
            shutdown_on_empty_queue: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// The User-Agent header value, e.g. `name/1.0 (+https://...; ops@...)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// robots.txt decision cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotsConfig {
    /// Maximum number of hosts with cached rules
    #[serde(rename = "cache-size")]
    pub cache_size: usize,

    /// Seconds an unused host entry stays cached
    #[serde(rename = "expire-after")]
    pub expire_after: u64,
}

impl RobotsConfig {
    pub fn expire_after(&self) -> Duration {
        Duration::from_secs(self.expire_after)
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            cache_size: 100,
            expire_after: 600,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file; omitted means in-memory stores
    #[serde(rename = "database-path")]
    pub database_path: Option<String>,
}
