//! The crawl engine
//!
//! [`CrawlEngine`] runs a fixed number of worker tasks. Each worker pops an
//! entry from the [`Scheduler`], walks it through the per-entry state machine
//! and goes back for more:
//!
//! ```text
//! Dequeued -> DepthChecked -> DedupChecked -> RobotsChecked -> Fetched
//!          -> LinksHarvested -> Dispatched
//! ```
//!
//! Any step may drop the entry instead. A dropped entry never stops the
//! crawl; only the page budget, a drained frontier, [`CrawlEngine::stop`] and
//! [`CrawlEngine::shutdown`] do.

use crate::config::{validate_crawler_config, CrawlerConfig, RobotsConfig};
use crate::crawler::quota::{QuotaGate, QuotaSlot};
use crate::crawler::{
    is_redirect_status, Crawler, Document, FetchError, Fetcher, PolitenessThrottle, Scheduler,
};
use crate::output::{CrawlStats, StatsRecorder};
use crate::robots::RobotsMinder;
use crate::state::{DropReason, EntryState};
use crate::storage::{
    FrontierQueue, HistoryEntry, HistoryStore, MemoryFrontierQueue, MemoryHistoryStore, QueueEntry,
};
use crate::url::CanonicalUrl;
use crate::{ConfigError, CrawlError, Result, UrlError};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// User agent matched against robots.txt groups when none is configured
pub const DEFAULT_USER_AGENT: &str = concat!("sumi-engine/", env!("CARGO_PKG_VERSION"));

/// What a fetch turned into
#[derive(Debug)]
pub enum FetchOutcome {
    /// GET response for a page `should_visit` accepted
    Visited(Document),

    /// HEAD response for a page only `should_check` accepted
    Checked(Document),

    /// Redirect to follow; `location` is `None` when the header is missing or
    /// does not resolve to a crawlable URL
    Redirected {
        status_code: u16,
        location: Option<CanonicalUrl>,
    },

    /// Transport failure
    Failed(FetchError),
}

impl FetchOutcome {
    /// Classifies a fetch result for `url`
    ///
    /// # Arguments
    ///
    /// * `url` - The fetched URL, used to resolve relative `Location` headers
    /// * `response` - What the fetcher returned
    /// * `visited` - True if the page was fetched for `visit` (GET)
    /// * `follow_redirects` - When false, redirect responses are delivered as pages
    pub fn classify(
        url: &CanonicalUrl,
        response: std::result::Result<Document, FetchError>,
        visited: bool,
        follow_redirects: bool,
    ) -> Self {
        match response {
            Err(e) => Self::Failed(e),
            Ok(doc) if follow_redirects && is_redirect_status(doc.status_code) => Self::Redirected {
                status_code: doc.status_code,
                location: doc
                    .redirect_location()
                    .and_then(|location| CanonicalUrl::parse(location, Some(url)).ok())
                    .filter(CanonicalUrl::is_crawlable),
            },
            Ok(doc) if visited => Self::Visited(doc),
            Ok(doc) => Self::Checked(doc),
        }
    }
}

/// Tracks one entry's position in the state machine
#[derive(Debug)]
struct EntryProgress {
    state: EntryState,
}

impl EntryProgress {
    fn new() -> Self {
        Self {
            state: EntryState::Dequeued,
        }
    }

    fn reach(&mut self, next: EntryState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal entry transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

struct EngineInner<C: Crawler> {
    crawler: C,
    config: CrawlerConfig,
    fetcher: Arc<dyn Fetcher>,
    history: Arc<dyn HistoryStore>,
    scheduler: Scheduler,
    robots: Arc<RobotsMinder>,
    throttle: Arc<PolitenessThrottle>,
    quota: QuotaGate,
    stats: StatsRecorder,
    /// Cancelled to stop picking up new entries
    admission: CancellationToken,
    /// Cancelled to abandon in-flight entries; cancelling it also cancels `admission`
    force: CancellationToken,
    next_root_id: AtomicI64,
    idle_workers: AtomicUsize,
    started: AtomicBool,
}

/// A configured crawl, ready to start
///
/// Cloning is cheap and every clone controls the same crawl, so a clone can
/// be kept around to call [`stop`](Self::stop) or
/// [`submit_url`](Self::submit_url) while another task awaits
/// [`start`](Self::start).
pub struct CrawlEngine<C: Crawler> {
    inner: Arc<EngineInner<C>>,
}

impl<C: Crawler> Clone for CrawlEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Crawler> CrawlEngine<C> {
    /// Starts building an engine around `crawler`
    pub fn builder(crawler: C, config: CrawlerConfig) -> CrawlEngineBuilder<C> {
        CrawlEngineBuilder::new(crawler, config)
    }

    /// Seeds the frontier and runs the crawl to completion
    ///
    /// Seeds that are not valid http(s) URLs are skipped with a warning.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStats)` - The crawl ended (budget, drained frontier, stop or shutdown)
    /// * `Err(CrawlError)` - The engine was already started, or a worker panicked
    pub async fn start<I, S>(&self, seeds: I) -> Result<CrawlStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.seed(seeds);
        self.clone().run().await
    }

    /// Seeds the frontier and runs the crawl on a background task
    ///
    /// `on_crawl_start` has fired by the time the crawl is running; the
    /// returned handle resolves once `on_crawl_end` has fired.
    pub fn spawn<I, S>(&self, seeds: I) -> JoinHandle<Result<CrawlStats>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.seed(seeds);
        tokio::spawn(self.clone().run())
    }

    /// Stops admitting new entries; in-flight entries finish normally
    pub fn stop(&self) {
        tracing::info!("Stop requested, finishing in-flight entries");
        self.inner.admission.cancel();
    }

    /// Stops immediately, abandoning in-flight entries
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested, abandoning in-flight entries");
        self.inner.force.cancel();
    }

    /// Adds a URL to the frontier as a new root at depth zero
    ///
    /// # Arguments
    ///
    /// * `url` - An absolute http(s) URL
    /// * `priority` - Lower values are popped first
    ///
    /// # Returns
    ///
    /// * `Ok(i64)` - The root page id identifying this submission
    /// * `Err(CrawlError)` - The URL is invalid or the frontier rejected it
    pub fn submit_url(&self, url: &str, priority: i8) -> Result<i64> {
        let url = CanonicalUrl::parse(url, None)?;
        if !url.is_crawlable() {
            return Err(UrlError::invalid(url.raw(), "not an http(s) URL").into());
        }

        let root_page_id = self.inner.next_root_id.fetch_add(1, Ordering::Relaxed);
        self.inner.scheduler.push(
            url.domain(),
            vec![QueueEntry::root(url.canonical_form(), root_page_id, priority)],
        )?;
        tracing::debug!("Submitted {} as root {}", url, root_page_id);
        Ok(root_page_id)
    }

    /// Removes every queued entry spawned by a submission
    pub fn cancel_root(&self, root_page_id: i64) -> Result<usize> {
        Ok(self.inner.scheduler.remove_root(root_page_id)?)
    }

    /// Pages counted against the page budget so far
    pub fn visit_count(&self) -> u64 {
        self.inner.quota.confirmed()
    }

    /// A snapshot of the crawl counters
    pub fn stats(&self) -> CrawlStats {
        self.inner.stats.snapshot()
    }

    /// Entries currently waiting in the frontier
    pub fn queued(&self) -> Result<usize> {
        Ok(self.inner.scheduler.len()?)
    }

    fn seed<I, S>(&self, seeds: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for seed in seeds {
            if let Err(e) = self.submit_url(seed.as_ref(), 0) {
                tracing::warn!("Skipping seed {}: {}", seed.as_ref(), e);
            }
        }
    }

    async fn run(self) -> Result<CrawlStats> {
        let inner = self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(CrawlError::Worker(
                "crawl engine has already been started".to_string(),
            ));
        }

        inner.crawler.on_crawl_start();
        tracing::info!(
            "Starting crawl with {} workers over {} frontier shards",
            inner.config.threads,
            inner.scheduler.shard_count()
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..inner.config.threads {
            workers.spawn(Arc::clone(&inner).work(worker_id));
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Crawl worker failed: {}", e);
                failure.get_or_insert_with(|| e.to_string());
            }
        }

        inner.crawler.on_crawl_end();
        let stats = inner.stats.snapshot();
        tracing::info!(
            "Crawl finished: {} pages, {} redirects, {} entries dropped",
            stats.pages,
            stats.redirects,
            stats.total_dropped()
        );

        match failure {
            Some(message) => Err(CrawlError::Worker(message)),
            None => Ok(stats),
        }
    }
}

impl<C: Crawler> EngineInner<C> {
    async fn work(self: Arc<Self>, worker_id: usize) {
        tracing::debug!("Worker {} started", worker_id);
        let mut idle = false;

        while !self.admission.is_cancelled() {
            match self.scheduler.pop(&self.admission).await {
                Some(entry) => {
                    if idle {
                        idle = false;
                        self.idle_workers.fetch_sub(1, Ordering::SeqCst);
                    }
                    let url = entry.url.clone();
                    tokio::select! {
                        _ = self.force.cancelled() => self.stats.record_drop(DropReason::Cancelled),
                        processed = AssertUnwindSafe(self.process(entry)).catch_unwind() => {
                            if let Err(panic) = processed {
                                tracing::error!(
                                    "Worker {} recovered from a panic on {}: {}",
                                    worker_id,
                                    url,
                                    panic_message(panic.as_ref())
                                );
                                self.stats.record_drop(DropReason::CallbackPanicked);
                            }
                        }
                    }
                }
                None if self.admission.is_cancelled() => break,
                None => {
                    if !idle {
                        idle = true;
                        let now_idle = self.idle_workers.fetch_add(1, Ordering::SeqCst) + 1;
                        if now_idle == self.config.threads {
                            self.drained();
                        }
                    }
                }
            }
        }

        tracing::debug!("Worker {} exiting", worker_id);
    }

    fn drained(&self) {
        tracing::info!(
            "Frontier empty for {:?} on every worker",
            self.config.empty_queue_wait_time()
        );
        self.crawler.on_empty_queue_timeout();
        if self.config.shutdown_on_empty_queue {
            self.admission.cancel();
        }
    }

    async fn process(&self, entry: QueueEntry) -> EntryState {
        let mut progress = EntryProgress::new();

        if let Err(reason) = self.advance(&entry, &mut progress).await {
            tracing::debug!("Dropped {} after {}: {}", entry.url, progress.state, reason);
            progress.reach(EntryState::Dropped);
            self.stats.record_drop(reason);
        }

        progress.state
    }

    async fn advance(
        &self,
        entry: &QueueEntry,
        progress: &mut EntryProgress,
    ) -> std::result::Result<(), DropReason> {
        let url = match CanonicalUrl::parse(&entry.url, None) {
            Ok(url) if url.is_crawlable() => url,
            _ => return Err(DropReason::InvalidUrl),
        };

        if let Some(limit) = self.config.depth_limit() {
            if entry.depth >= limit {
                return Err(DropReason::DepthExceeded);
            }
        }
        progress.reach(EntryState::DepthChecked);

        let page = match self.history.insert_if_unseen(&url) {
            Ok(Some(page)) => page,
            Ok(None) => {
                let parent = entry
                    .parent
                    .as_ref()
                    .and_then(|parent| CanonicalUrl::parse(&parent.url, None).ok());
                self.crawler.on_repeat_visit(&url, parent.as_ref());
                return Err(DropReason::RepeatVisit);
            }
            Err(e) => {
                tracing::warn!("History store unavailable for {}: {}", url, e);
                return Err(DropReason::StoreUnavailable);
            }
        };
        progress.reach(EntryState::DedupChecked);

        let visit = self.crawler.should_visit(&url);
        let check = self.crawler.should_check(&url);
        if !visit && !check {
            return Err(DropReason::NotWanted);
        }

        if self.config.respect_robots_txt && !self.robots.is_safe_to_visit(&url).await {
            tracing::debug!("{} disallowed by robots.txt", url);
            return Err(DropReason::RobotsDenied);
        }
        progress.reach(EntryState::RobotsChecked);

        let Some(slot) = self.quota.reserve(&self.force).await else {
            return Err(DropReason::QuotaExhausted);
        };
        self.throttle
            .wait(url.host(), self.config.politeness_delay())
            .await;

        let response = if visit {
            self.fetcher.get(&url).await
        } else {
            self.fetcher.head(&url).await
        };

        let (children, document) =
            match FetchOutcome::classify(&url, response, visit, self.config.follow_redirects) {
                FetchOutcome::Failed(e) => {
                    drop(slot);
                    tracing::debug!("Fetch failed for {}: {}", url, e);
                    self.crawler.on_content_fetch_error(&url, &e.to_string());
                    return Err(DropReason::FetchFailed);
                }
                FetchOutcome::Redirected {
                    status_code,
                    location,
                } => {
                    drop(slot);
                    progress.reach(EntryState::Fetched);
                    self.stats.update(|stats| stats.redirects += 1);
                    tracing::debug!(
                        "{} redirected ({}) to {}",
                        url,
                        status_code,
                        location
                            .as_ref()
                            .map_or("nowhere usable", CanonicalUrl::canonical_form)
                    );
                    let children: Vec<QueueEntry> = location
                        .map(|target| QueueEntry::child(target.canonical_form(), entry, &page, entry.depth))
                        .into_iter()
                        .collect();
                    (children, None)
                }
                FetchOutcome::Visited(doc) | FetchOutcome::Checked(doc) => {
                    self.count_page(slot);
                    progress.reach(EntryState::Fetched);
                    (self.harvest(&url, &doc, entry, &page), Some(doc))
                }
            };
        progress.reach(EntryState::LinksHarvested);

        self.enqueue(&url, children);
        if let Some(doc) = document {
            if visit {
                self.crawler.visit(&url, &doc);
                self.stats.update(|stats| stats.visited += 1);
            }
            if check {
                self.crawler.check(&url, doc.status_code);
                self.stats.update(|stats| stats.checked += 1);
            }
        }
        progress.reach(EntryState::Dispatched);

        Ok(())
    }

    /// Confirms the reserved slot and stops admission once the budget is spent
    fn count_page(&self, slot: QuotaSlot<'_>) {
        let pages = slot.confirm();
        self.stats.update(|stats| stats.pages = stats.pages.max(pages));

        if self.quota.is_exhausted() && !self.admission.is_cancelled() {
            tracing::info!("Page budget of {} reached, stopping", pages);
            self.admission.cancel();
        }
    }

    fn harvest(
        &self,
        url: &CanonicalUrl,
        doc: &Document,
        entry: &QueueEntry,
        page: &HistoryEntry,
    ) -> Vec<QueueEntry> {
        let depth = entry.depth + 1;
        doc.outgoing_urls(url, self.config.max_href_length)
            .iter()
            .map(|child| QueueEntry::child(child.canonical_form(), entry, page, depth))
            .collect()
    }

    fn enqueue(&self, url: &CanonicalUrl, children: Vec<QueueEntry>) {
        if children.is_empty() {
            return;
        }

        match self.scheduler.push(url.domain(), children) {
            Ok(stored) => {
                tracing::trace!("Enqueued {} links from {}", stored.len(), url);
                self.stats
                    .update(|stats| stats.links_enqueued += stored.len() as u64);
            }
            Err(e) => {
                tracing::warn!("Failed to enqueue links from {}: {}", url, e);
                self.stats.update(|stats| stats.store_errors += 1);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Assembles a [`CrawlEngine`]
///
/// Only the fetcher is required. Everything else defaults to in-memory
/// stores and engine-private robots and politeness state; pass shared
/// instances to let several engines cooperate.
pub struct CrawlEngineBuilder<C: Crawler> {
    crawler: C,
    config: CrawlerConfig,
    user_agent: String,
    robots_config: RobotsConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    history: Option<Arc<dyn HistoryStore>>,
    frontier: Option<Vec<Arc<dyn FrontierQueue>>>,
    robots: Option<Arc<RobotsMinder>>,
    throttle: Option<Arc<PolitenessThrottle>>,
}

impl<C: Crawler> CrawlEngineBuilder<C> {
    pub fn new(crawler: C, config: CrawlerConfig) -> Self {
        Self {
            crawler,
            config,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            robots_config: RobotsConfig::default(),
            fetcher: None,
            history: None,
            frontier: None,
            robots: None,
            throttle: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Sets the frontier shards; defaults to `queue_shards` in-memory queues
    pub fn frontier(mut self, shards: Vec<Arc<dyn FrontierQueue>>) -> Self {
        self.frontier = Some(shards);
        self
    }

    /// Shares a robots minder; build it
    /// [`with_politeness`](RobotsMinder::with_politeness) over the same
    /// throttle so robots.txt fetches are spaced like page fetches
    pub fn robots_minder(mut self, robots: Arc<RobotsMinder>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn politeness_throttle(mut self, throttle: Arc<PolitenessThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Sets the user agent matched against robots.txt groups
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn robots_config(mut self, robots_config: RobotsConfig) -> Self {
        self.robots_config = robots_config;
        self
    }

    /// Validates the configuration and builds the engine
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlEngine)` - Ready to start
    /// * `Err(CrawlError)` - Invalid configuration, no fetcher, or no frontier shards
    pub fn build(self) -> Result<CrawlEngine<C>> {
        validate_crawler_config(&self.config)?;

        let fetcher = self
            .fetcher
            .ok_or_else(|| ConfigError::Validation("a fetcher is required".to_string()))?;
        let frontier = self.frontier.unwrap_or_else(|| {
            (0..self.config.shard_count())
                .map(|_| Arc::new(MemoryFrontierQueue::new()) as Arc<dyn FrontierQueue>)
                .collect()
        });
        let scheduler = Scheduler::new(frontier, &self.config)?;
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(MemoryHistoryStore::new()));
        let throttle = self
            .throttle
            .unwrap_or_else(|| Arc::new(PolitenessThrottle::new()));
        let robots = self.robots.unwrap_or_else(|| {
            Arc::new(
                RobotsMinder::new(
                    self.user_agent.clone(),
                    Arc::clone(&fetcher),
                    &self.robots_config,
                )
                .with_politeness(Arc::clone(&throttle), self.config.politeness_delay()),
            )
        });

        let force = CancellationToken::new();
        let admission = force.child_token();

        Ok(CrawlEngine {
            inner: Arc::new(EngineInner {
                crawler: self.crawler,
                quota: QuotaGate::new(self.config.page_quota()),
                config: self.config,
                fetcher,
                history,
                scheduler,
                robots,
                throttle,
                stats: StatsRecorder::default(),
                admission,
                force,
                // Root ids start from the clock so they stay unique across
                // runs sharing a persistent frontier
                next_root_id: AtomicI64::new(Utc::now().timestamp_micros()),
                idle_workers: AtomicUsize::new(0),
                started: AtomicBool::new(false),
            }),
        })
    }
}
