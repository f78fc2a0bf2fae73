//! Incremental ingestion of discussion-board posts.
//!
//! For every tracked user the engine crawls the user's paginated listing feed
//! back to a per-user watermark (the newest stored post time), then commits
//! the newly seen posts, their topics ("brands") and unread markers in one
//! transaction per user.
//!
//! # Architecture
//!
//! ```text
//! roster ──► users + watermarks ──► CrawlScheduler (N permits)
//!                                        │  Paginator per user
//!                                        │    PageFetcher ──► extract_page
//!                                        ▼
//!                               sequential collector ──► ingest_batch
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use board_watch::{engine, Config, HttpFetcher, RunContext};
//!
//! let config = Config::from_env()?;
//! let fetcher = Arc::new(HttpFetcher::new(&config.user_agent, config.fetch_timeout)?);
//! let ctx = RunContext::open(config).await?;
//!
//! let now = Utc::now().with_timezone(&ctx.config().site_offset);
//! let summary = engine::run(&ctx, fetcher, CancellationToken::new(), now).await?;
//! ctx.close().await;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod ingest;
pub mod models;
pub mod paginator;
pub mod roster;
pub mod scheduler;
pub mod store;
pub mod testing;
pub mod timestamp;
pub mod watermark;

pub use config::Config;
pub use engine::{run, RunContext, RunSummary, UserReport, UserStatus};
pub use error::{
    ConfigError, CrawlError, CrawlResult, ExtractError, FetchError, IngestError, IngestResult,
    RosterError,
};
pub use extractor::{extract_page, ExtractedPage, ListingPage, PostRecord, Reference};
pub use fetcher::{HttpFetcher, PageFetcher};
pub use ingest::{ingest_batch, BatchOutcome};
pub use paginator::{Paginator, PaginatorConfig};
pub use roster::{load_roster, sync_roster, RosterEntry};
pub use scheduler::{CrawlResults, CrawlScheduler, FeedJob, UserCrawl};
pub use store::Store;
