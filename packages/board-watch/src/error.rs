//! Typed errors for the ingestion engine.
//!
//! Errors are grouped by how far they propagate:
//! - [`ExtractError`] affects a single listing item and never escalates
//! - [`CrawlError`] and [`IngestError`] abort one user's batch
//! - [`RosterError`] and [`ConfigError`] abort the whole run

use thiserror::Error;

/// Errors that can occur while fetching a listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed (transport, timeout, body decoding)
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// HTTP client could not be constructed
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// URL could not be parsed or joined
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Item-level extraction errors. The item is dropped, the page continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// Breadcrumb anchor naming the brand is missing
    #[error("brand anchor not found")]
    MissingBrand,

    /// Header text does not start with "No."
    #[error("not a comment no.: {0:?}")]
    MalformedCommentNo(String),

    /// Header anchor with title and link is missing
    #[error("title anchor not found")]
    MissingTitle,

    /// Date text does not match `yyyy/mm/dd hh:mm`
    #[error("invalid post time: {0:?}")]
    InvalidPostTime(String),

    /// Reference anchor text has no space separating the number
    #[error("not a ref no.: {0:?}")]
    MalformedReference(String),
}

/// Errors that abort one user's crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A page could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Shutdown was requested before the crawl finished
    #[error("crawl cancelled")]
    Cancelled,

    /// Page cap reached before the watermark
    #[error("page limit of {pages} reached before the watermark")]
    PageLimit { pages: usize },

    /// Next-page link points back to a page already crawled
    #[error("next-page link loops back to {url}")]
    Cycle { url: String },

    /// The crawl task panicked
    #[error("crawl panicked: {0}")]
    Panicked(String),
}

/// Errors that abort (and roll back) one user's ingestion batch.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Storage operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored timestamp does not match `YYYY-MM-DD hh:mm:ss`
    #[error("malformed timestamp {value:?}: {source}")]
    MalformedTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// A post arrived without a brand name
    #[error("brand name is empty")]
    EmptyBrandName,
}

/// Errors reading the roster file.
#[derive(Debug, Error)]
pub enum RosterError {
    /// File could not be read
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid roster document
    #[error("invalid roster {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid configuration value.
#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Result type alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for storage and ingestion operations.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
