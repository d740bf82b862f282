//! Integration tests for crawl sessions
//!
//! Most tests run a session against an in-memory site so page contents and
//! fetch counts are exact. The last test goes through the real HTTP fetcher
//! against a wiremock server.

use async_trait::async_trait;
use catalog_harvester::config::{
    CrawlerConfig, DriverConfig, HostOverride, SchedulerConfig, SelectorConfig, SessionConfig,
};
use catalog_harvester::crawler::{
    CrawlSession, DocumentFetcher, DriverError, DriverResult, FetchedDocument, HttpFetcher, Page,
    PageDriver, PagePool, StaticPageDriver,
};
use catalog_harvester::scheduler::{JobScheduler, SessionRunner};
use catalog_harvester::storage::{BlobStore, FsBlobStore, SqliteJobStore};
use catalog_harvester::JobStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves fixed documents and records every fetch
#[derive(Default)]
struct SiteFetcher {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl SiteFetcher {
    fn page(mut self, url: &str, body: String) -> Self {
        self.pages.insert(url.to_string(), body);
        self
    }

    fn fetch_count(&self, url: &str) -> usize {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl DocumentFetcher for SiteFetcher {
    async fn fetch(&self, url: &Url) -> DriverResult<FetchedDocument> {
        self.fetched.lock().unwrap().push(url.to_string());
        match self.pages.get(url.as_str()) {
            Some(body) => Ok(FetchedDocument {
                final_url: url.clone(),
                body: body.clone(),
            }),
            None => Err(DriverError::Navigation {
                url: url.to_string(),
                message: "HTTP 404".to_string(),
            }),
        }
    }
}

fn listing_page(cards: &[&str], next: Option<&str>) -> String {
    let cards: String = cards
        .iter()
        .map(|href| format!(r#"<div class="card"><a href="{}">item</a></div>"#, href))
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
        .unwrap_or_default();
    format!("<html><body><main>{}</main>{}</body></html>", cards, next)
}

fn product_page(n: u32) -> String {
    format!(
        r#"<html><body>
            <h1>Product {n}</h1>
            <span class="price">{n}.99</span>
            <table><tr><th>EAN</th><td>{ean:013}</td></tr></table>
        </body></html>"#,
        n = n,
        ean = n
    )
}

fn crawler_config(start: &str, listing: &str, product: &str) -> CrawlerConfig {
    CrawlerConfig {
        start_urls: vec![start.to_string()],
        listing_patterns: vec![listing.to_string()],
        product_patterns: vec![product.to_string()],
        selectors: SelectorConfig {
            product_card: ".card".to_string(),
            pagination: "a.next".to_string(),
            product_link: "a.product-link".to_string(),
            product_name: "h1".to_string(),
            product_price: ".price".to_string(),
        },
        max_pages: None,
        ean_label: None,
    }
}

fn shop_config() -> CrawlerConfig {
    crawler_config(
        "https://www.shop.test/list",
        "https://www.shop.test/list",
        "https://www.shop-items.test/p",
    )
}

/// Three listing pages holding four distinct products plus duplicates
fn shop_site() -> SiteFetcher {
    SiteFetcher::default()
        .page(
            "https://www.shop.test/list",
            listing_page(
                &["https://www.shop-items.test/p/1", "https://www.shop-items.test/p/2"],
                Some("/list?page=2"),
            ),
        )
        .page(
            "https://www.shop.test/list?page=2",
            listing_page(
                &[
                    "https://www.shop-items.test/p/3",
                    "https://www.shop-items.test/p/4",
                    "https://www.shop-items.test/p/1/",
                ],
                Some("/list?page=3"),
            ),
        )
        .page(
            "https://www.shop.test/list?page=3",
            listing_page(&["https://www.shop-items.test/p/2#reviews"], None),
        )
        .page("https://www.shop-items.test/p/1", product_page(1))
        .page("https://www.shop-items.test/p/2", product_page(2))
        .page("https://www.shop-items.test/p/3", product_page(3))
        .page("https://www.shop-items.test/p/4", product_page(4))
}

fn session(
    config: CrawlerConfig,
    fetcher: Arc<SiteFetcher>,
    blob_dir: &TempDir,
) -> CrawlSession {
    let driver: Arc<dyn PageDriver> = Arc::new(StaticPageDriver::new(fetcher));
    let pool = Arc::new(PagePool::new(driver, 4));
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(blob_dir.path()));
    CrawlSession::new(Uuid::new_v4(), config, SessionConfig::default(), pool, blobs)
}

#[tokio::test]
async fn test_crawl_extracts_products_across_listing_pages() {
    let blob_dir = TempDir::new().unwrap();
    let site = Arc::new(shop_site());

    let result = session(shop_config(), Arc::clone(&site), &blob_dir)
        .run()
        .await
        .unwrap();

    assert_eq!(result.processed_items, 4);
    assert_eq!(result.items.len(), 4);
    assert_eq!(result.metadata.listing_pages, 3);
    assert_eq!(result.metadata.product_pages, 4);
    assert_eq!(result.metadata.pages_visited, 7);
    assert_eq!(result.metadata.extraction_failures, 0);
    assert!(!result.metadata.budget_exhausted);

    let mut names: Vec<&str> = result.items.iter().map(|r| r.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["Product 1", "Product 2", "Product 3", "Product 4"]);

    let first = result
        .items
        .iter()
        .find(|r| r.name == "Product 1")
        .unwrap();
    assert_eq!(first.price, "1.99");
    assert_eq!(first.ean.as_deref(), Some("0000000000001"));

    let key = first.storage_key.as_deref().unwrap();
    assert!(key.starts_with("products/"));
    assert!(blob_dir.path().join(key).exists());
}

#[tokio::test]
async fn test_duplicate_links_visited_once() {
    let blob_dir = TempDir::new().unwrap();
    let site = Arc::new(shop_site());

    let result = session(shop_config(), Arc::clone(&site), &blob_dir)
        .run()
        .await
        .unwrap();

    // "/p/1/" and "/p/2#reviews" normalize onto links already queued
    assert!(result.metadata.duplicates_suppressed >= 2);
    assert_eq!(site.fetch_count("https://www.shop-items.test/p/1"), 1);
    assert_eq!(site.fetch_count("https://www.shop-items.test/p/2"), 1);
}

#[tokio::test]
async fn test_pagination_stops_at_max_pages() {
    let blob_dir = TempDir::new().unwrap();
    let mut fetcher = SiteFetcher::default();
    for n in 1..=5 {
        let url = if n == 1 {
            "https://www.shop.test/list".to_string()
        } else {
            format!("https://www.shop.test/list?page={}", n)
        };
        let next = format!("/list?page={}", n + 1);
        fetcher = fetcher.page(
            &url,
            listing_page(&["https://elsewhere.test/item"], Some(next.as_str())),
        );
    }
    let site = Arc::new(fetcher);

    let mut config = shop_config();
    config.max_pages = Some(3);

    let result = session(config, Arc::clone(&site), &blob_dir)
        .run()
        .await
        .unwrap();

    assert_eq!(result.metadata.listing_pages, 3);
    assert_eq!(result.processed_items, 0);
    assert!(site.fetch_count("https://www.shop.test/list?page=3") > 0);
    assert_eq!(site.fetch_count("https://www.shop.test/list?page=4"), 0);
}

#[tokio::test]
async fn test_tracked_next_link_does_not_revisit_listing() {
    let blob_dir = TempDir::new().unwrap();
    let page2 = listing_page(&["https://www.shop-items.test/p/2"], None);
    let site = Arc::new(
        SiteFetcher::default()
            .page(
                "https://www.shop.test/list",
                listing_page(
                    &["https://www.shop-items.test/p/1", "/list?page=2"],
                    Some("/list?page=2&utm_source=pager"),
                ),
            )
            .page("https://www.shop.test/list?page=2", page2.clone())
            .page("https://www.shop.test/list?page=2&utm_source=pager", page2)
            .page("https://www.shop-items.test/p/1", product_page(1))
            .page("https://www.shop-items.test/p/2", product_page(2)),
    );

    let result = session(shop_config(), Arc::clone(&site), &blob_dir)
        .run()
        .await
        .unwrap();

    assert_eq!(result.processed_items, 2);
    assert_eq!(result.metadata.listing_pages, 2);
    assert_eq!(site.fetch_count("https://www.shop.test/list?page=2"), 1);
    // only the click on page 1 loads the tracked URL
    assert_eq!(
        site.fetch_count("https://www.shop.test/list?page=2&utm_source=pager"),
        1
    );
}

#[tokio::test]
async fn test_product_load_failure_is_a_page_failure() {
    let blob_dir = TempDir::new().unwrap();
    let site = Arc::new(
        SiteFetcher::default()
            .page(
                "https://www.shop.test/list",
                listing_page(
                    &["https://www.shop-items.test/p/1", "https://www.shop-items.test/p/404"],
                    None,
                ),
            )
            .page("https://www.shop-items.test/p/1", product_page(1)),
    );

    let result = session(shop_config(), site, &blob_dir).run().await.unwrap();

    assert_eq!(result.processed_items, 1);
    assert_eq!(result.metadata.product_pages, 2);
    assert_eq!(result.metadata.page_failures, 1);
    assert_eq!(result.metadata.extraction_failures, 0);
}

const SCRIPTED_LISTING: &str = "https://www.shop.test/list";

/// A listing whose pages all share one URL; only clicks move between them
struct ScriptedSite {
    pages: u32,
    /// Page count seen by every load after the first
    shrinks_to: Option<u32>,
    loads: AtomicUsize,
    furthest: AtomicU32,
    cards_read: Mutex<Vec<u32>>,
}

impl ScriptedSite {
    fn new(pages: u32) -> Self {
        Self {
            pages,
            shrinks_to: None,
            loads: AtomicUsize::new(0),
            furthest: AtomicU32::new(1),
            cards_read: Mutex::new(Vec::new()),
        }
    }

    fn cards_read(&self) -> Vec<u32> {
        let mut pages = self.cards_read.lock().unwrap().clone();
        pages.sort();
        pages
    }
}

struct ScriptedPage {
    site: Arc<ScriptedSite>,
    loaded: bool,
    current: u32,
    total: u32,
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&mut self, url: &Url) -> DriverResult<()> {
        if url.as_str() != SCRIPTED_LISTING {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                message: "HTTP 404".to_string(),
            });
        }
        let earlier = self.site.loads.fetch_add(1, Ordering::SeqCst);
        self.total = match self.site.shrinks_to {
            Some(pages) if earlier > 0 => pages,
            _ => self.site.pages,
        };
        self.loaded = true;
        self.current = 1;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> DriverResult<()> {
        if self.loaded && selector == ".card" {
            Ok(())
        } else {
            Err(DriverError::SelectorTimeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn exists(&mut self, selector: &str) -> DriverResult<bool> {
        Ok(selector == "a.next" && self.loaded && self.current < self.total)
    }

    async fn text(&mut self, _selector: &str) -> DriverResult<Option<String>> {
        Ok(None)
    }

    async fn hrefs(&mut self, selector: &str, _limit: usize) -> DriverResult<Vec<String>> {
        if selector != ".card" {
            return Ok(Vec::new());
        }
        self.site.cards_read.lock().unwrap().push(self.current);
        Ok(vec![format!("https://elsewhere.test/item/{}", self.current)])
    }

    async fn labelled_text(&mut self, _label: &str) -> DriverResult<Option<String>> {
        Ok(None)
    }

    async fn click(&mut self, selector: &str) -> DriverResult<()> {
        if selector == "a.next" && self.current < self.total {
            self.current += 1;
            self.site.furthest.fetch_max(self.current, Ordering::SeqCst);
            Ok(())
        } else {
            Err(DriverError::Click {
                selector: selector.to_string(),
                message: "no element".to_string(),
            })
        }
    }

    async fn content(&mut self) -> DriverResult<String> {
        Ok(String::new())
    }

    fn location(&self) -> Option<Url> {
        self.loaded.then(|| Url::parse(SCRIPTED_LISTING).unwrap())
    }
}

struct ScriptedDriver(Arc<ScriptedSite>);

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
        Ok(Box::new(ScriptedPage {
            site: Arc::clone(&self.0),
            loaded: false,
            current: 1,
            total: 0,
        }))
    }
}

fn scripted_session(site: Arc<ScriptedSite>, max_pages: u32, blob_dir: &TempDir) -> CrawlSession {
    let driver: Arc<dyn PageDriver> = Arc::new(ScriptedDriver(site));
    let pool = Arc::new(PagePool::new(driver, 2));
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(blob_dir.path()));
    let mut config = shop_config();
    config.max_pages = Some(max_pages);
    CrawlSession::new(Uuid::new_v4(), config, SessionConfig::default(), pool, blobs)
}

#[tokio::test]
async fn test_same_url_pagination_replays_clicks() {
    let blob_dir = TempDir::new().unwrap();
    let site = Arc::new(ScriptedSite::new(6));

    let result = scripted_session(Arc::clone(&site), 3, &blob_dir)
        .run()
        .await
        .unwrap();

    // each visit reloads the listing and clicks back to its page
    assert_eq!(site.loads.load(Ordering::SeqCst), 3);
    assert_eq!(site.cards_read(), vec![1, 2, 3]);
    assert_eq!(site.furthest.load(Ordering::SeqCst), 3);
    assert_eq!(result.metadata.listing_pages, 3);
    assert_eq!(result.metadata.page_failures, 0);
    assert_eq!(result.metadata.pages_visited, 3);
}

#[tokio::test]
async fn test_same_url_replay_falling_short_fails_the_page() {
    let blob_dir = TempDir::new().unwrap();
    let mut site = ScriptedSite::new(5);
    site.shrinks_to = Some(1);
    let site = Arc::new(site);

    let result = scripted_session(Arc::clone(&site), 10, &blob_dir)
        .run()
        .await
        .unwrap();

    assert_eq!(site.cards_read(), vec![1]);
    assert_eq!(result.metadata.listing_pages, 2);
    assert_eq!(result.metadata.page_failures, 1);
}

#[tokio::test]
async fn test_missing_product_card_is_a_page_failure() {
    let blob_dir = TempDir::new().unwrap();
    let site = Arc::new(SiteFetcher::default().page(
        "https://www.shop.test/list",
        "<html><body><p>Nothing here</p></body></html>".to_string(),
    ));

    let result = session(shop_config(), site, &blob_dir).run().await.unwrap();

    assert_eq!(result.processed_items, 0);
    assert_eq!(result.metadata.listing_pages, 1);
    assert_eq!(result.metadata.page_failures, 1);
}

#[tokio::test]
async fn test_product_without_ean_is_skipped() {
    let blob_dir = TempDir::new().unwrap();
    let site = Arc::new(
        SiteFetcher::default()
            .page(
                "https://www.shop.test/list",
                listing_page(
                    &["https://www.shop-items.test/p/1", "https://www.shop-items.test/p/9"],
                    None,
                ),
            )
            .page("https://www.shop-items.test/p/1", product_page(1))
            .page(
                "https://www.shop-items.test/p/9",
                r#"<html><body><h1>No code</h1><span class="price">5.00</span></body></html>"#
                    .to_string(),
            ),
    );

    let result = session(shop_config(), site, &blob_dir).run().await.unwrap();

    assert_eq!(result.processed_items, 1);
    assert_eq!(result.metadata.extraction_failures, 1);
}

#[tokio::test]
async fn test_scheduler_runs_session_to_completion() {
    let blob_dir = TempDir::new().unwrap();
    let site: Arc<dyn DocumentFetcher> = Arc::new(shop_site());
    let driver: Arc<dyn PageDriver> = Arc::new(StaticPageDriver::new(site));
    let pool = Arc::new(PagePool::new(driver, 8));
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(blob_dir.path()));
    let runner = SessionRunner::new(pool, blobs, SessionConfig::default());

    let scheduler = JobScheduler::new(
        Box::new(SqliteJobStore::new_in_memory().unwrap()),
        Arc::new(runner),
        SchedulerConfig {
            poll_interval_ms: 20,
            ..Default::default()
        },
    );
    scheduler.start().unwrap();

    let submitted = scheduler.submit(shop_config()).unwrap();

    let view = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let view = scheduler.status(submitted.id).unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.attempts_made, 1);
    assert_eq!(view.result.as_ref().unwrap().processed_items, 4);
    assert_eq!(view.progress.products_extracted, 4);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_crawl_over_http() {
    let mock_server = MockServer::start().await;
    let port = mock_server.address().port();
    let shop = format!("http://www.shop.test:{}", port);
    let items = format!("http://www.shop-items.test:{}", port);

    let first = format!("{}/p/1", items);
    let second = format!("{}/p/2", items);
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&[first.as_str(), second.as_str()], None))
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    for n in 1..=2 {
        Mock::given(method("GET"))
            .and(path(format!("/p/{}", n)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(product_page(n))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&mock_server)
            .await;
    }

    let address = mock_server.address().to_string();
    let driver_config = DriverConfig {
        host_overrides: vec![
            HostOverride {
                host: "www.shop.test".to_string(),
                address: address.clone(),
            },
            HostOverride {
                host: "www.shop-items.test".to_string(),
                address,
            },
        ],
        ..Default::default()
    };
    let fetcher: Arc<dyn DocumentFetcher> = Arc::new(HttpFetcher::from_config(&driver_config).unwrap());
    let driver: Arc<dyn PageDriver> = Arc::new(StaticPageDriver::new(fetcher));
    let pool = Arc::new(PagePool::new(driver, 2));

    let blob_dir = TempDir::new().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(blob_dir.path()));
    let config = crawler_config(
        &format!("{}/list", shop),
        &format!("{}/list", shop),
        &format!("{}/p", items),
    );

    let result = CrawlSession::new(Uuid::new_v4(), config, SessionConfig::default(), pool, blobs)
        .run()
        .await
        .unwrap();

    assert_eq!(result.processed_items, 2);
    assert_eq!(result.metadata.page_failures, 0);
}
