//! Callback surface implemented by users of the engine
//!
//! The engine calls these from its worker tasks, so implementations must be
//! cheap to share and must synchronize any state they mutate.

use crate::crawler::Document;
use crate::url::CanonicalUrl;

/// Decides what gets crawled and receives the results
///
/// Only [`should_visit`](Crawler::should_visit) and [`visit`](Crawler::visit)
/// are required; every other hook defaults to a no-op.
pub trait Crawler: Send + Sync + 'static {
    /// Returns true if the page should be fetched with GET and handed to
    /// [`visit`](Crawler::visit)
    fn should_visit(&self, url: &CanonicalUrl) -> bool;

    /// Returns true if the page should be status-checked with HEAD and
    /// handed to [`check`](Crawler::check)
    ///
    /// When both predicates accept a URL it is fetched once with GET and both
    /// callbacks fire.
    fn should_check(&self, _url: &CanonicalUrl) -> bool {
        false
    }

    /// Receives a fetched page
    fn visit(&self, url: &CanonicalUrl, doc: &Document);

    /// Receives the status code of a checked page
    fn check(&self, _url: &CanonicalUrl, _status_code: u16) {}

    /// Called when a URL is popped that the crawl has already admitted
    ///
    /// # Arguments
    ///
    /// * `url` - The repeated URL
    /// * `parent` - The page it was found on (`None` for seeds and submissions)
    fn on_repeat_visit(&self, _url: &CanonicalUrl, _parent: Option<&CanonicalUrl>) {}

    /// Called when fetching a page failed at the transport level
    fn on_content_fetch_error(&self, _url: &CanonicalUrl, _reason: &str) {}

    /// Called once before any worker starts
    fn on_crawl_start(&self) {}

    /// Called once after every worker has exited
    fn on_crawl_end(&self) {}

    /// Called when every worker has waited out the empty-queue timeout
    fn on_empty_queue_timeout(&self) {}
}

impl<C: Crawler> Crawler for std::sync::Arc<C> {
    fn should_visit(&self, url: &CanonicalUrl) -> bool {
        (**self).should_visit(url)
    }

    fn should_check(&self, url: &CanonicalUrl) -> bool {
        (**self).should_check(url)
    }

    fn visit(&self, url: &CanonicalUrl, doc: &Document) {
        (**self).visit(url, doc)
    }

    fn check(&self, url: &CanonicalUrl, status_code: u16) {
        (**self).check(url, status_code)
    }

    fn on_repeat_visit(&self, url: &CanonicalUrl, parent: Option<&CanonicalUrl>) {
        (**self).on_repeat_visit(url, parent)
    }

    fn on_content_fetch_error(&self, url: &CanonicalUrl, reason: &str) {
        (**self).on_content_fetch_error(url, reason)
    }

    fn on_crawl_start(&self) {
        (**self).on_crawl_start()
    }

    fn on_crawl_end(&self) {
        (**self).on_crawl_end()
    }

    fn on_empty_queue_timeout(&self) {
        (**self).on_empty_queue_timeout()
    }
}
