//! Static HTML page driver
//!
//! Renders nothing: each navigation fetches the document through a
//! `DocumentFetcher` and queries it with CSS selectors. Clicking an element
//! that carries an `href` navigates to it; elements without one cannot be
//! clicked. Documents never change after load, so a selector that is absent
//! is reported as a timeout immediately.

use crate::config::DriverConfig;
use crate::crawler::driver::{DriverError, DriverResult, Page, PageDriver};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use scraper::{ElementRef, Html, Selector};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A fetched document
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// URL after redirects
    pub final_url: Url,
    pub body: String,
}

/// Loads documents for the static driver
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> DriverResult<FetchedDocument>;
}

/// Builds the HTTP client used for page fetches
///
/// # Arguments
///
/// * `config` - The driver configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &DriverConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    for entry in &config.host_overrides {
        match entry.address.parse::<SocketAddr>() {
            Ok(addr) => builder = builder.resolve(&entry.host, addr),
            Err(e) => {
                tracing::warn!(host = %entry.host, address = %entry.address, error = %e, "skipping bad host override")
            }
        }
    }

    builder.build()
}

/// Fetches documents over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &DriverConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> DriverResult<FetchedDocument> {
        let navigation_error = |message: String| DriverError::Navigation {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| navigation_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(navigation_error(format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| navigation_error(format!("failed to read body: {}", e)))?;

        Ok(FetchedDocument { final_url, body })
    }
}

/// Page driver over fetched, unrendered HTML
#[derive(Clone)]
pub struct StaticPageDriver {
    fetcher: Arc<dyn DocumentFetcher>,
}

impl StaticPageDriver {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PageDriver for StaticPageDriver {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
        Ok(Box::new(StaticPage {
            fetcher: Arc::clone(&self.fetcher),
            location: None,
            html: None,
        }))
    }
}

/// A page context holding one fetched document
///
/// The raw HTML is kept and re-parsed per query, since parsed documents
/// cannot be held across await points.
pub struct StaticPage {
    fetcher: Arc<dyn DocumentFetcher>,
    location: Option<Url>,
    html: Option<String>,
}

impl StaticPage {
    fn document(&self) -> DriverResult<Html> {
        self.html
            .as_deref()
            .map(Html::parse_document)
            .ok_or(DriverError::NoDocument)
    }
}

fn parse_selector(selector: &str) -> DriverResult<Selector> {
    Selector::parse(selector).map_err(|e| DriverError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|t| &**t)
        .collect()
}

/// The element's own href, or its first descendant anchor's
fn element_href(element: ElementRef<'_>) -> Option<String> {
    if let Some(href) = element.value().attr("href") {
        return Some(href.trim().to_string());
    }

    let anchor = Selector::parse("a[href]").ok()?;
    element
        .select(&anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
}

fn next_element_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// Finds the value paired with a label element
///
/// Tries, in order: the label's next sibling (`<th>EAN</th><td>...`), the
/// next sibling of the label's parent (`<td><b>EAN</b></td><td>...`), and
/// the text after the label within the same element (`EAN: ...`).
fn find_labelled_value(document: &Html, label: &str) -> Option<String> {
    let all = Selector::parse("body *").ok()?;

    for element in document.select(&all) {
        let own = own_text(element);
        let Some(position) = own.find(label) else {
            continue;
        };

        if let Some(value) = next_element_sibling(element).and_then(element_text) {
            return Some(value);
        }

        let parent_sibling = element
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(next_element_sibling)
            .and_then(element_text);
        if let Some(value) = parent_sibling {
            return Some(value);
        }

        let rest = own[position + label.len()..]
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .trim();
        if !rest.is_empty() {
            return Some(rest.to_string());
        }
    }

    None
}

#[async_trait]
impl Page for StaticPage {
    async fn goto(&mut self, url: &Url) -> DriverResult<()> {
        let document = self.fetcher.fetch(url).await?;
        self.location = Some(document.final_url);
        self.html = Some(document.body);
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> DriverResult<()> {
        if self.exists(selector).await? {
            Ok(())
        } else {
            Err(DriverError::SelectorTimeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn exists(&mut self, selector: &str) -> DriverResult<bool> {
        let parsed = parse_selector(selector)?;
        let document = self.document()?;
        let found = document.select(&parsed).next().is_some();
        Ok(found)
    }

    async fn text(&mut self, selector: &str) -> DriverResult<Option<String>> {
        let parsed = parse_selector(selector)?;
        let document = self.document()?;
        let text = document.select(&parsed).next().and_then(element_text);
        Ok(text)
    }

    async fn hrefs(&mut self, selector: &str, limit: usize) -> DriverResult<Vec<String>> {
        let parsed = parse_selector(selector)?;
        let document = self.document()?;
        let hrefs = document
            .select(&parsed)
            .filter_map(element_href)
            .filter(|href| !href.is_empty())
            .take(limit)
            .collect();
        Ok(hrefs)
    }

    async fn labelled_text(&mut self, label: &str) -> DriverResult<Option<String>> {
        let document = self.document()?;
        Ok(find_labelled_value(&document, label))
    }

    async fn click(&mut self, selector: &str) -> DriverResult<()> {
        let target = {
            let parsed = parse_selector(selector)?;
            let document = self.document()?;
            let element = document
                .select(&parsed)
                .next()
                .ok_or_else(|| DriverError::Click {
                    selector: selector.to_string(),
                    message: "no matching element".to_string(),
                })?;
            element.value().attr("href").map(|h| h.trim().to_string())
        };

        let href = target.ok_or_else(|| DriverError::Click {
            selector: selector.to_string(),
            message: "element has no link target".to_string(),
        })?;

        let next = Url::options()
            .base_url(self.location.as_ref())
            .parse(&href)
            .map_err(|e| DriverError::Click {
                selector: selector.to_string(),
                message: format!("bad link target '{}': {}", href, e),
            })?;

        self.goto(&next).await
    }

    async fn content(&mut self) -> DriverResult<String> {
        self.html.clone().ok_or(DriverError::NoDocument)
    }

    fn location(&self) -> Option<Url> {
        self.location.clone()
    }
}
