//! Integration tests for the crawl engine
//!
//! Most tests drive the engine through a scripted in-process [`Fetcher`] so
//! that timing and request order can be inspected. The wiremock tests at the
//! bottom run the full cycle against a mock HTTP server.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_engine::config::{CrawlerConfig, UserAgentConfig};
use sumi_engine::crawler::{CrawlEngine, Crawler, Document, FetchError, Fetcher, HttpFetcher};
use sumi_engine::storage::{FrontierQueue, HistoryStore, SqliteFrontierQueue, SqliteHistoryStore};
use sumi_engine::{CanonicalUrl, DropReason};
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A scripted web: canned responses keyed by canonical URL
#[derive(Default)]
struct FakeWeb {
    pages: HashMap<String, (u16, HashMap<String, String>, String)>,
    robots: HashMap<String, String>,
    broken: HashSet<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<(String, Instant)>>,
}

impl FakeWeb {
    fn new() -> Self {
        Self::default()
    }

    fn page(mut self, url: &str, html: &str) -> Self {
        let headers = HashMap::from([("content-type".to_string(), "text/html".to_string())]);
        self.pages
            .insert(url.to_string(), (200, headers, html.to_string()));
        self
    }

    fn redirect(mut self, url: &str, status: u16, location: &str) -> Self {
        let headers = HashMap::from([("location".to_string(), location.to_string())]);
        self.pages
            .insert(url.to_string(), (status, headers, String::new()));
        self
    }

    fn robots(mut self, origin: &str, body: &str) -> Self {
        self.robots.insert(origin.to_string(), body.to_string());
        self
    }

    fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Page requests in arrival order, robots.txt fetches left out
    fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .filter(|url| !url.ends_with("/robots.txt"))
            .collect()
    }

    fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    async fn respond(&self, url: &CanonicalUrl, with_body: bool) -> Result<Document, FetchError> {
        let key = url.canonical_form().to_string();
        self.requests.lock().unwrap().push((key.clone(), Instant::now()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.broken.contains(&key) {
            return Err(FetchError::Connect {
                url: key,
                message: "connection refused".to_string(),
            });
        }

        let (status, headers, body) = self
            .pages
            .get(&key)
            .cloned()
            .unwrap_or_else(|| (404, HashMap::new(), String::new()));
        let body = if with_body { body } else { String::new() };
        Ok(Document::from_parts(status, headers, body, 2048))
    }
}

#[async_trait]
impl Fetcher for FakeWeb {
    async fn get(&self, url: &CanonicalUrl) -> Result<Document, FetchError> {
        self.respond(url, true).await
    }

    async fn head(&self, url: &CanonicalUrl) -> Result<Document, FetchError> {
        self.respond(url, false).await
    }

    async fn fetch_robots_txt(&self, url: &CanonicalUrl) -> Result<String, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.robots_txt_url(), Instant::now()));
        self.robots
            .get(url.origin())
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.robots_txt_url(),
                status: 404,
            })
    }
}

/// Records every callback the engine makes
#[derive(Default)]
struct Recorder {
    visit_hosts: Vec<String>,
    check_hosts: Vec<String>,
    visited: Mutex<Vec<String>>,
    checked: Mutex<Vec<(String, u16)>>,
    repeats: Mutex<Vec<(String, Option<String>)>>,
    errors: Mutex<Vec<String>>,
    starts: AtomicUsize,
    ends: AtomicUsize,
    empty_timeouts: AtomicUsize,
}

impl Recorder {
    fn visiting(hosts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            visit_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            ..Self::default()
        })
    }

    fn visiting_and_checking(visit: &[&str], check: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            visit_hosts: visit.iter().map(|h| h.to_string()).collect(),
            check_hosts: check.iter().map(|h| h.to_string()).collect(),
            ..Self::default()
        })
    }

    fn visited(&self) -> Vec<String> {
        let mut visited = self.visited.lock().unwrap().clone();
        visited.sort();
        visited
    }
}

impl Crawler for Recorder {
    fn should_visit(&self, url: &CanonicalUrl) -> bool {
        self.visit_hosts.iter().any(|host| host == url.host())
    }

    fn should_check(&self, url: &CanonicalUrl) -> bool {
        self.check_hosts.iter().any(|host| host == url.host())
    }

    fn visit(&self, url: &CanonicalUrl, _doc: &Document) {
        self.visited.lock().unwrap().push(url.to_string());
    }

    fn check(&self, url: &CanonicalUrl, status_code: u16) {
        self.checked
            .lock()
            .unwrap()
            .push((url.to_string(), status_code));
    }

    fn on_repeat_visit(&self, url: &CanonicalUrl, parent: Option<&CanonicalUrl>) {
        self.repeats
            .lock()
            .unwrap()
            .push((url.to_string(), parent.map(|p| p.to_string())));
    }

    fn on_content_fetch_error(&self, url: &CanonicalUrl, _reason: &str) {
        self.errors.lock().unwrap().push(url.to_string());
    }

    fn on_crawl_start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_crawl_end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }

    fn on_empty_queue_timeout(&self) {
        self.empty_timeouts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records like [`Recorder`] but panics when visiting one URL
struct Fragile {
    recorder: Arc<Recorder>,
    panic_on: &'static str,
}

impl Crawler for Fragile {
    fn should_visit(&self, url: &CanonicalUrl) -> bool {
        self.recorder.should_visit(url)
    }

    fn visit(&self, url: &CanonicalUrl, doc: &Document) {
        if url.canonical_form() == self.panic_on {
            panic!("visit callback failed on {}", url);
        }
        self.recorder.visit(url, doc);
    }

    fn on_crawl_end(&self) {
        self.recorder.on_crawl_end();
    }
}

/// Serves a [`FakeWeb`] but panics when asked for one page
struct PanickingFetcher {
    web: Arc<FakeWeb>,
    panic_on: &'static str,
}

#[async_trait]
impl Fetcher for PanickingFetcher {
    async fn get(&self, url: &CanonicalUrl) -> Result<Document, FetchError> {
        if url.canonical_form() == self.panic_on {
            panic!("fetcher failed on {}", url);
        }
        self.web.get(url).await
    }

    async fn head(&self, url: &CanonicalUrl) -> Result<Document, FetchError> {
        self.web.head(url).await
    }

    async fn fetch_robots_txt(&self, url: &CanonicalUrl) -> Result<String, FetchError> {
        self.web.fetch_robots_txt(url).await
    }
}

/// Creates a fast test configuration
fn create_test_config(threads: usize) -> CrawlerConfig {
    CrawlerConfig {
        threads,
        politeness_delay: 0,
        empty_queue_wait_time: 100,
        ..CrawlerConfig::default()
    }
}

fn engine(
    recorder: &Arc<Recorder>,
    web: &Arc<FakeWeb>,
    config: CrawlerConfig,
) -> CrawlEngine<Arc<Recorder>> {
    CrawlEngine::builder(Arc::clone(recorder), config)
        .fetcher(Arc::clone(web) as Arc<dyn Fetcher>)
        .build()
        .expect("Failed to build engine")
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_crawl_follows_links_on_one_site() {
    let web = Arc::new(
        FakeWeb::new()
            .page(
                "http://a.test/",
                r##"<a href="/b">B</a><a href="#top">Top</a><a href="mailto:x@a.test">Mail</a>"##,
            )
            .page("http://a.test/b", r#"<a href="/">Home</a><a href="http://z.test/">Away</a>"#),
    );
    let recorder = Recorder::visiting(&["a.test"]);

    let stats = engine(&recorder, &web, create_test_config(2))
        .start(["http://a.test/"])
        .await
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/", "http://a.test/b"]);
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.visited, 2);
    assert_eq!(
        *recorder.repeats.lock().unwrap(),
        vec![("http://a.test/".to_string(), Some("http://a.test/b".to_string()))]
    );
    assert_eq!(stats.dropped(DropReason::RepeatVisit), 1);
    assert_eq!(stats.dropped(DropReason::NotWanted), 1);

    assert_eq!(recorder.starts.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.empty_timeouts.load(Ordering::SeqCst), 1);

    // z.test was never wanted, so it was never fetched
    assert!(!web.requested().iter().any(|url| url.contains("z.test")));
}

#[tokio::test]
async fn test_robots_disallow_is_respected() {
    let web = Arc::new(
        FakeWeb::new()
            .robots("http://a.test", "User-agent: *\nDisallow: /private")
            .page(
                "http://a.test/",
                r#"<a href="/private/page">P</a><a href="/public">Q</a>"#,
            )
            .page("http://a.test/public", "<p>open</p>")
            .page("http://a.test/private/page", "<p>secret</p>"),
    );
    let recorder = Recorder::visiting(&["a.test"]);

    let stats = engine(&recorder, &web, create_test_config(1))
        .start(["http://a.test/"])
        .await
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/", "http://a.test/public"]);
    assert_eq!(stats.dropped(DropReason::RobotsDenied), 1);
    assert!(!web.requested().contains(&"http://a.test/private/page".to_string()));
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let web = Arc::new(
        FakeWeb::new()
            .robots("http://a.test", "User-agent: *\nDisallow: /")
            .page("http://a.test/", "<p>home</p>"),
    );
    let recorder = Recorder::visiting(&["a.test"]);
    let config = CrawlerConfig {
        respect_robots_txt: false,
        ..create_test_config(1)
    };

    engine(&recorder, &web, config)
        .start(["http://a.test/"])
        .await
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/"]);
}

#[tokio::test]
async fn test_redirect_is_followed_at_same_depth_without_counting() {
    let web = Arc::new(
        FakeWeb::new()
            .redirect("http://a.test/", 301, "/new")
            .page("http://a.test/new", "<p>moved here</p>"),
    );
    let recorder = Recorder::visiting(&["a.test"]);
    let config = CrawlerConfig {
        max_depth: 1,
        total_pages: 1,
        ..create_test_config(1)
    };

    let engine = engine(&recorder, &web, config);
    let stats = engine.start(["http://a.test/"]).await.unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/new"]);
    assert_eq!(stats.redirects, 1);
    assert_eq!(stats.pages, 1);
    assert_eq!(engine.visit_count(), 1);
}

#[tokio::test]
async fn test_redirect_delivered_as_page_when_not_following() {
    let web = Arc::new(
        FakeWeb::new()
            .redirect("http://a.test/", 302, "/new")
            .page("http://a.test/new", "<p>moved here</p>"),
    );
    let recorder = Recorder::visiting(&["a.test"]);
    let config = CrawlerConfig {
        follow_redirects: false,
        ..create_test_config(1)
    };

    let stats = engine(&recorder, &web, config)
        .start(["http://a.test/"])
        .await
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/"]);
    assert_eq!(stats.redirects, 0);
}

#[tokio::test]
async fn test_page_budget_holds_across_workers() {
    let hosts = ["a.test", "b.test", "c.test", "d.test", "e.test"];
    let mut web = FakeWeb::new();
    for host in hosts {
        web = web.page(
            &format!("http://{}/", host),
            r#"<a href="/1">1</a><a href="/2">2</a><a href="/3">3</a>"#,
        );
    }
    let web = Arc::new(web);
    let recorder = Recorder::visiting(&hosts);
    let config = CrawlerConfig {
        total_pages: 1,
        ..create_test_config(4)
    };

    let seeds: Vec<String> = hosts.iter().map(|h| format!("http://{}/", h)).collect();
    let stats = engine(&recorder, &web, config).start(&seeds).await.unwrap();

    assert_eq!(recorder.visited().len(), 1);
    assert_eq!(stats.pages, 1);
    assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_fetch_releases_budget() {
    let web = Arc::new(
        FakeWeb::new()
            .broken("http://a.test/down")
            .page("http://a.test/up", "<p>fine</p>"),
    );
    let recorder = Recorder::visiting(&["a.test"]);
    let config = CrawlerConfig {
        total_pages: 1,
        ..create_test_config(1)
    };

    let stats = engine(&recorder, &web, config)
        .start(["http://a.test/down", "http://a.test/up"])
        .await
        .unwrap();

    assert_eq!(*recorder.errors.lock().unwrap(), vec!["http://a.test/down"]);
    assert_eq!(recorder.visited(), vec!["http://a.test/up"]);
    assert_eq!(stats.dropped(DropReason::FetchFailed), 1);
    assert_eq!(stats.pages, 1);
}

fn three_page_site() -> Arc<FakeWeb> {
    Arc::new(
        FakeWeb::new()
            .page("http://a.test/", r#"<a href="/b">B</a><a href="/c">C</a>"#)
            .page("http://a.test/b", "")
            .page("http://a.test/c", ""),
    )
}

#[tokio::test]
async fn test_panicking_visit_callback_does_not_stall_crawl() {
    let web = three_page_site();
    let recorder = Recorder::visiting(&["a.test"]);
    let crawler = Fragile {
        recorder: Arc::clone(&recorder),
        panic_on: "http://a.test/b",
    };
    let config = CrawlerConfig {
        total_pages: 10,
        empty_queue_wait_time: 50,
        ..create_test_config(2)
    };

    let engine = CrawlEngine::builder(crawler, config)
        .fetcher(Arc::clone(&web) as Arc<dyn Fetcher>)
        .build()
        .expect("Failed to build engine");
    let stats = tokio::time::timeout(Duration::from_secs(5), engine.start(["http://a.test/"]))
        .await
        .expect("crawl did not end after a callback panic")
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/", "http://a.test/c"]);
    assert_eq!(stats.dropped(DropReason::CallbackPanicked), 1);
    assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panic_mid_fetch_returns_budget_slot() {
    let web = three_page_site();
    let fetcher = PanickingFetcher {
        web: Arc::clone(&web),
        panic_on: "http://a.test/b",
    };
    let recorder = Recorder::visiting(&["a.test"]);
    // one worker takes /b before /c, so /c can only run on the slot /b held
    let config = CrawlerConfig {
        total_pages: 2,
        empty_queue_wait_time: 50,
        ..create_test_config(1)
    };

    let engine = CrawlEngine::builder(Arc::clone(&recorder), config)
        .fetcher(Arc::new(fetcher) as Arc<dyn Fetcher>)
        .build()
        .expect("Failed to build engine");
    let stats = tokio::time::timeout(Duration::from_secs(5), engine.start(["http://a.test/"]))
        .await
        .expect("crawl did not end after a fetcher panic")
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/", "http://a.test/c"]);
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.dropped(DropReason::CallbackPanicked), 1);
}

#[tokio::test]
async fn test_depth_limit_drops_deep_entries() {
    let web = Arc::new(
        FakeWeb::new()
            .page("http://a.test/", r#"<a href="/1">1</a>"#)
            .page("http://a.test/1", r#"<a href="/2">2</a>"#)
            .page("http://a.test/2", r#"<a href="/3">3</a>"#),
    );
    let recorder = Recorder::visiting(&["a.test"]);
    let config = CrawlerConfig {
        max_depth: 2,
        ..create_test_config(1)
    };

    let stats = engine(&recorder, &web, config)
        .start(["http://a.test/"])
        .await
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/", "http://a.test/1"]);
    assert_eq!(stats.dropped(DropReason::DepthExceeded), 1);
    assert!(!web.requested().contains(&"http://a.test/2".to_string()));
}

#[tokio::test]
async fn test_equivalent_urls_are_fetched_once() {
    let web = Arc::new(FakeWeb::new().page("http://a.test/x", "<p>x</p>"));
    let recorder = Recorder::visiting(&["a.test"]);

    engine(&recorder, &web, create_test_config(3))
        .start([
            "http://a.test/x",
            "HTTP://A.TEST:80/x#section",
            "http://a.test/./y/../x",
        ])
        .await
        .unwrap();

    assert_eq!(recorder.visited(), vec!["http://a.test/x"]);
    assert_eq!(web.requested(), vec!["http://a.test/x"]);

    let repeats = recorder.repeats.lock().unwrap();
    assert_eq!(repeats.len(), 2);
    assert!(repeats.iter().all(|(_, parent)| parent.is_none()));
}

#[tokio::test]
async fn test_check_uses_head_status() {
    let web = Arc::new(
        FakeWeb::new()
            .page(
                "http://a.test/",
                r#"<a href="http://b.test/ok">ok</a><a href="http://b.test/missing">missing</a>"#,
            )
            .page("http://b.test/ok", "<a href=\"/never\">never</a>"),
    );
    let recorder = Recorder::visiting_and_checking(&["a.test"], &["b.test"]);

    let stats = engine(&recorder, &web, create_test_config(2))
        .start(["http://a.test/"])
        .await
        .unwrap();

    let mut checked = recorder.checked.lock().unwrap().clone();
    checked.sort();
    assert_eq!(
        checked,
        vec![
            ("http://b.test/missing".to_string(), 404),
            ("http://b.test/ok".to_string(), 200),
        ]
    );
    assert_eq!(stats.checked, 2);
    assert_eq!(stats.pages, 3);
    // HEAD responses have no body, so nothing on b.test is followed
    assert!(!web.requested().contains(&"http://b.test/never".to_string()));
}

#[tokio::test]
async fn test_politeness_spaces_requests_to_one_host() {
    let web = Arc::new(
        FakeWeb::new()
            .page("http://a.test/1", "")
            .page("http://a.test/2", "")
            .page("http://a.test/3", "")
            .robots("http://a.test", "User-agent: *\nDisallow: /private"),
    );
    let recorder = Recorder::visiting(&["a.test"]);
    let delay = Duration::from_millis(50);
    let config = CrawlerConfig {
        politeness_delay: 50,
        ..create_test_config(3)
    };

    engine(&recorder, &web, config)
        .start(["http://a.test/1", "http://a.test/2", "http://a.test/3"])
        .await
        .unwrap();

    // the robots.txt fetch is spaced like the three page fetches
    let mut times = web.request_times();
    times.sort();
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= delay - Duration::from_millis(5));
    }
}

#[tokio::test]
async fn test_stop_ends_crawl_that_keeps_polling() {
    let web = Arc::new(FakeWeb::new().page("http://a.test/", "<p>home</p>"));
    let recorder = Recorder::visiting(&["a.test"]);
    let config = CrawlerConfig {
        shutdown_on_empty_queue: false,
        empty_queue_wait_time: 30,
        ..create_test_config(2)
    };

    let engine = engine(&recorder, &web, config);
    let crawl = engine.spawn(["http://a.test/"]);

    wait_until("first drain", || {
        recorder.empty_timeouts.load(Ordering::SeqCst) >= 1
    })
    .await;
    assert!(!crawl.is_finished());

    // the crawl revives when new work shows up
    engine.submit_url("http://a.test/late", 0).unwrap();
    wait_until("late visit", || recorder.visited().len() == 2).await;

    engine.stop();
    let stats = crawl.await.unwrap().unwrap();
    assert_eq!(stats.visited, 2);
    assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_abandons_in_flight_fetch() {
    let web = Arc::new(
        FakeWeb::new()
            .page("http://a.test/", "<p>slow</p>")
            .slow(Duration::from_secs(30)),
    );
    let recorder = Recorder::visiting(&["a.test"]);

    let engine = engine(&recorder, &web, create_test_config(1));
    let crawl = engine.spawn(["http://a.test/"]);

    wait_until("fetch to begin", || web.requested().len() == 1).await;
    let started = Instant::now();
    engine.shutdown();

    let stats = crawl.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(recorder.visited().is_empty());
    assert_eq!(stats.dropped(DropReason::Cancelled), 1);
    assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
}

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// Mounts a small site: an index linking to two pages, one of them moved
async fn mount_site(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: testbot\nDisallow: /admin"),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head><title>Home</title></head><body>
                    <a href="/page1">Page 1</a>
                    <a href="/old">Old</a>
                    <a href="/admin">Admin</a>
                    </body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><body><a href="/">Home</a></body></html>"#)
                .insert_header("content-type", "text/html"),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(308).insert_header("location", "/page2"))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Page 2</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_against_http_server() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;
    let base_url = mock_server.uri();
    let host = CanonicalUrl::parse(&base_url, None).unwrap().host().to_string();

    let recorder = Recorder::visiting(&[host.as_str()]);
    let fetcher = HttpFetcher::new(&test_user_agent(), 2048).expect("Failed to build fetcher");
    let engine = CrawlEngine::builder(Arc::clone(&recorder), create_test_config(2))
        .fetcher(Arc::new(fetcher))
        .user_agent(test_user_agent().header_value())
        .build()
        .unwrap();

    let stats = engine.start([format!("{}/", base_url)]).await.unwrap();

    assert_eq!(
        recorder.visited(),
        vec![
            format!("{}/", base_url),
            format!("{}/page1", base_url),
            format!("{}/page2", base_url),
        ]
    );
    assert_eq!(stats.redirects, 1);
    assert_eq!(stats.dropped(DropReason::RobotsDenied), 1);
}

#[tokio::test]
async fn test_sqlite_history_persists_across_runs() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;
    let base_url = mock_server.uri();
    let host = CanonicalUrl::parse(&base_url, None).unwrap().host().to_string();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("crawl.db");

    let run = |recorder: Arc<Recorder>| {
        let history: Arc<dyn HistoryStore> =
            Arc::new(SqliteHistoryStore::open(&db_path).expect("Failed to open history"));
        let frontier: Vec<Arc<dyn FrontierQueue>> = vec![Arc::new(
            SqliteFrontierQueue::open(&db_path, 0).expect("Failed to open frontier"),
        )];
        let fetcher = HttpFetcher::new(&test_user_agent(), 2048).expect("Failed to build fetcher");
        CrawlEngine::builder(recorder, create_test_config(1))
            .fetcher(Arc::new(fetcher))
            .history(history)
            .frontier(frontier)
            .build()
            .unwrap()
    };

    let first = Recorder::visiting(&[host.as_str()]);
    run(Arc::clone(&first))
        .start([format!("{}/", base_url)])
        .await
        .unwrap();
    assert_eq!(first.visited().len(), 3);

    let second = Recorder::visiting(&[host.as_str()]);
    let stats = run(Arc::clone(&second))
        .start([format!("{}/", base_url)])
        .await
        .unwrap();
    assert!(second.visited().is_empty());
    assert_eq!(stats.dropped(DropReason::RepeatVisit), 1);
}
