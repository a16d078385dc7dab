//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The crawl engine and its per-entry state machine
//! - HTTP fetching and HTML link extraction
//! - Frontier scheduling, per-host politeness and the page budget
//! - The callback trait crawl users implement

mod callbacks;
mod engine;
mod fetcher;
mod parser;
mod politeness;
mod quota;
mod scheduler;

pub use callbacks::Crawler;
pub use engine::{CrawlEngine, CrawlEngineBuilder, FetchOutcome, DEFAULT_USER_AGENT};
pub use fetcher::{
    build_http_client, is_redirect_status, Document, FetchError, Fetcher, HttpFetcher,
    REDIRECT_STATUSES,
};
pub use parser::{parse_html, Anchor, ParsedPage};
pub use politeness::PolitenessThrottle;
pub use quota::{QuotaGate, QuotaSlot};
pub use scheduler::Scheduler;
