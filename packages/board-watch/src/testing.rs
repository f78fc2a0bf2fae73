//! Test helpers: listing page fixtures and a canned-response fetcher.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use crate::timestamp::LISTING_FORMAT;

pub use crate::config::jst;

/// One `li.commentBox` item of a listing page.
#[derive(Debug, Clone)]
pub struct ListingItemFixture {
    pub brand: Option<String>,
    pub header: String,
    pub title: Option<String>,
    pub url: String,
    pub date: String,
    pub post_time: DateTime<FixedOffset>,
    pub detail: String,
    pub reference: Option<(String, String)>,
}

impl ListingItemFixture {
    pub fn new(brand: &str, comment_no: &str, post_time: DateTime<FixedOffset>) -> Self {
        Self {
            brand: Some(brand.to_string()),
            header: format!("No. {}", comment_no),
            title: Some(format!("Comment {}", comment_no)),
            url: format!("/comments/{}", comment_no),
            date: post_time.format(LISTING_FORMAT).to_string(),
            post_time,
            detail: format!("Detail of {}", comment_no),
            reference: None,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = detail.to_string();
        self
    }

    pub fn with_header(mut self, header: &str) -> Self {
        self.header = header.to_string();
        self
    }

    pub fn with_raw_date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    pub fn with_reference(mut self, text: &str, href: &str) -> Self {
        self.reference = Some((text.to_string(), href.to_string()));
        self
    }

    pub fn without_brand(mut self) -> Self {
        self.brand = None;
        self
    }

    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    fn to_html(&self) -> String {
        let breadcrumbs = match &self.brand {
            Some(brand) => format!(
                r#"<div class="breadcrumbs"><ul><li><a href="/brands/{brand}">{brand}</a></li></ul></div>"#
            ),
            None => r#"<div class="breadcrumbs"><ul><li>unknown</li></ul></div>"#.to_string(),
        };

        let title = match &self.title {
            Some(title) => format!(r#"<h2><a href="{}">{}</a></h2>"#, self.url, title),
            None => "<h2>untitled</h2>".to_string(),
        };

        let reference = match &self.reference {
            Some((text, href)) => format!(r#"<span><a href="{href}">{text}</a></span>"#),
            None => String::new(),
        };

        format!(
            r#"<li class="commentBox">
  {breadcrumbs}
  <div class="commentHeaderInfo"><div>{header}</div>{title}</div>
  <div class="ttlInfoDateNum"><p>{date}</p></div>
  <div class="detail">{reference}<p>{detail}</p></div>
</li>"#,
            header = self.header,
            date = self.date,
            detail = self.detail,
        )
    }
}

/// Render a listing page, optionally with a "next page" link.
pub fn listing_html(items: &[ListingItemFixture], next_page: Option<&str>) -> String {
    let body: String = items.iter().map(ListingItemFixture::to_html).collect();
    let pager = next_page
        .map(|href| format!(r#"<div class="pager"><a href="{href}">次のページ</a></div>"#))
        .unwrap_or_default();

    format!(
        r#"<html><head><title>Comments</title></head><body>
<ul class="commentList">
{body}
</ul>
<div class="pager"><a href="/help">ヘルプ</a></div>
{pager}
</body></html>"#
    )
}

/// Fetcher answering from a URL → HTML map. Unknown URLs answer HTTP 404.
///
/// Records every requested URL and the peak number of concurrent fetches.
#[derive(Default)]
pub struct StaticFetcher {
    pages: Arc<RwLock<HashMap<String, String>>>,
    latency: Duration,
    calls: Arc<RwLock<Vec<String>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url` (builder pattern).
    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.add_page(url, html);
        self
    }

    /// Delay every response, so concurrent fetches overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add_page(&self, url: &str, html: impl Into<String>) {
        self.pages.write().unwrap().insert(url.to_string(), html.into());
    }

    pub fn remove_page(&self, url: &str) {
        self.pages.write().unwrap().remove(url);
    }

    /// URLs requested so far, in request order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Highest number of fetches that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        self.calls.write().unwrap().push(url.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.pages
            .read()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
