//! Listing page extraction.
//!
//! A listing is a list of `li.commentBox` items, newest first. Items are
//! extracted lazily and extraction stops at the first item that is not newer
//! than the watermark: everything after it is already stored.

use chrono::{DateTime, FixedOffset};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::ExtractError;
use crate::store::MAX_DETAIL_CHARS;
use crate::timestamp;

/// Characters stripped from both ends of extracted text (includes the full-width space).
const TRIM_CHARS: &[char] = &[' ', '\u{3000}', '\n', '\r', '\t'];

struct Selectors {
    item: Selector,
    brand: Selector,
    comment_no: Selector,
    title: Selector,
    date: Selector,
    detail: Selector,
    reference: Selector,
    paragraph: Selector,
    link: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).expect("static selector is valid");
        Selectors {
            item: parse("li.commentBox"),
            brand: parse("div.breadcrumbs ul li a"),
            comment_no: parse("div.commentHeaderInfo div"),
            title: parse("div.commentHeaderInfo h2 a"),
            date: parse("div.ttlInfoDateNum p"),
            detail: parse("div.detail"),
            reference: parse("span a"),
            paragraph: parse("p"),
            link: parse("a[href]"),
        }
    })
}

/// Reply/citation pointing at another post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub no: String,
    pub url: String,
}

/// One post as found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub brand_name: String,
    pub brand_url: String,
    pub comment_no: String,
    pub title: String,
    pub url: String,
    pub reference: Option<Reference>,
    pub detail: String,
    pub post_time: DateTime<FixedOffset>,
}

/// What a single listing item turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Post(PostRecord),
    Skipped(ExtractError),
}

/// A parsed listing page.
pub struct ListingPage {
    document: Html,
    page_url: Url,
}

impl ListingPage {
    pub fn parse(html: &str, page_url: Url) -> Self {
        Self {
            document: Html::parse_document(html),
            page_url,
        }
    }

    pub fn url(&self) -> &Url {
        &self.page_url
    }

    /// Lazily extract items newer than `watermark`.
    pub fn items(&self, watermark: DateTime<FixedOffset>, tz: FixedOffset) -> ListingItems<'_> {
        ListingItems {
            elements: self.document.select(&selectors().item),
            page_url: &self.page_url,
            watermark,
            tz,
            cutoff_reached: false,
        }
    }

    /// First anchor whose text contains `link_text`, resolved against the page URL.
    pub fn next_page(&self, link_text: &str) -> Option<Url> {
        self.document
            .select(&selectors().link)
            .find(|anchor| anchor.text().collect::<String>().contains(link_text))
            .and_then(|anchor| anchor.value().attr("href"))
            .and_then(|href| self.page_url.join(href.trim()).ok())
    }
}

/// Iterator over the items of one page. Ends at the end of the page or at the
/// first item not newer than the watermark, whichever comes first.
pub struct ListingItems<'a> {
    elements: scraper::html::Select<'a, 'static>,
    page_url: &'a Url,
    watermark: DateTime<FixedOffset>,
    tz: FixedOffset,
    cutoff_reached: bool,
}

impl ListingItems<'_> {
    /// Whether iteration stopped on an already-known item.
    pub fn cutoff_reached(&self) -> bool {
        self.cutoff_reached
    }
}

impl Iterator for ListingItems<'_> {
    type Item = ItemOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cutoff_reached {
            return None;
        }

        let element = self.elements.next()?;

        let post_time = match item_post_time(element, self.tz) {
            Ok(time) => time,
            Err(e) => return Some(ItemOutcome::Skipped(e)),
        };

        if post_time <= self.watermark {
            debug!(post_time = %post_time, watermark = %self.watermark, "Reached watermark");
            self.cutoff_reached = true;
            return None;
        }

        Some(match extract_item(element, post_time, self.page_url) {
            Ok(post) => ItemOutcome::Post(post),
            Err(e) => ItemOutcome::Skipped(e),
        })
    }
}

/// Everything taken from one page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// Newest first, as listed
    pub posts: Vec<PostRecord>,
    pub skipped: Vec<ExtractError>,
    pub cutoff_reached: bool,
    pub next_page: Option<Url>,
}

/// Extract a whole page. Malformed items are logged and skipped.
pub fn extract_page(
    html: &str,
    page_url: Url,
    watermark: DateTime<FixedOffset>,
    tz: FixedOffset,
    next_page_text: &str,
) -> ExtractedPage {
    let page = ListingPage::parse(html, page_url);
    let mut extracted = ExtractedPage::default();

    let mut items = page.items(watermark, tz);
    for outcome in items.by_ref() {
        match outcome {
            ItemOutcome::Post(post) => extracted.posts.push(post),
            ItemOutcome::Skipped(e) => {
                warn!(page = %page.url(), error = %e, "Skipping malformed listing item");
                extracted.skipped.push(e);
            }
        }
    }
    extracted.cutoff_reached = items.cutoff_reached();

    if !extracted.cutoff_reached {
        extracted.next_page = page.next_page(next_page_text);
    }

    extracted
}

fn item_post_time(element: ElementRef<'_>, tz: FixedOffset) -> Result<DateTime<FixedOffset>, ExtractError> {
    let text = element
        .select(&selectors().date)
        .next()
        .map(element_text)
        .unwrap_or_default();

    timestamp::parse_listing(&text, tz).ok_or(ExtractError::InvalidPostTime(text))
}

fn extract_item(
    element: ElementRef<'_>,
    post_time: DateTime<FixedOffset>,
    page_url: &Url,
) -> Result<PostRecord, ExtractError> {
    let s = selectors();

    let (brand_url, brand_name) = element
        .select(&s.brand)
        .next()
        .and_then(|anchor| href_and_text(anchor, page_url))
        .filter(|(_, name)| !name.is_empty())
        .ok_or(ExtractError::MissingBrand)?;

    let header = element
        .select(&s.comment_no)
        .next()
        .map(element_text)
        .unwrap_or_default();
    let comment_no = parse_comment_no(&header)?;

    let (url, title) = element
        .select(&s.title)
        .next()
        .and_then(|anchor| href_and_text(anchor, page_url))
        .ok_or(ExtractError::MissingTitle)?;

    let mut reference = None;
    let mut detail = String::new();

    if let Some(block) = element.select(&s.detail).next() {
        if let Some((ref_url, ref_text)) = block
            .select(&s.reference)
            .next()
            .and_then(|anchor| href_and_text(anchor, page_url))
        {
            match parse_ref_no(&ref_text) {
                Ok(no) => reference = Some(Reference { no, url: ref_url }),
                Err(e) => warn!(comment_no = %comment_no, error = %e, "Dropping malformed reference"),
            }
        }

        let text: String = block.select(&s.paragraph).flat_map(|p| p.text()).collect();
        detail = trim(&text).chars().take(MAX_DETAIL_CHARS).collect();
    }

    Ok(PostRecord {
        brand_name,
        brand_url,
        comment_no,
        title,
        url,
        reference,
        detail,
        post_time,
    })
}

/// Trim the listing's whitespace set, including the full-width space.
pub fn trim(s: &str) -> &str {
    s.trim_matches(TRIM_CHARS)
}

fn element_text(element: ElementRef<'_>) -> String {
    trim(&element.text().collect::<String>()).to_string()
}

/// `href` (resolved against the page) and trimmed text of an anchor.
fn href_and_text(anchor: ElementRef<'_>, page_url: &Url) -> Option<(String, String)> {
    let href = anchor.value().attr("href")?.trim();
    let resolved = page_url
        .join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string());
    Some((resolved, element_text(anchor)))
}

/// `"No. 123"` → `"123"` (prefix is case-insensitive).
pub fn parse_comment_no(text: &str) -> Result<String, ExtractError> {
    let trimmed = trim(text);
    match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("no.") => Ok(trim(&trimmed[3..]).to_string()),
        _ => Err(ExtractError::MalformedCommentNo(text.to_string())),
    }
}

/// Reference number is the text after the first space.
pub fn parse_ref_no(text: &str) -> Result<String, ExtractError> {
    match text.find(' ') {
        Some(i) => Ok(text[i + 1..].to_string()),
        None => Err(ExtractError::MalformedReference(text.to_string())),
    }
}
