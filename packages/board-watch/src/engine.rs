//! One ingestion run: users → crawl scheduler → sequential collector.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{CrawlError, IngestResult};
use crate::fetcher::PageFetcher;
use crate::ingest::{ingest_batch, BatchOutcome};
use crate::models::User;
use crate::paginator::{Paginator, PaginatorConfig};
use crate::scheduler::{CrawlScheduler, FeedJob, UserCrawl};
use crate::store::Store;
use crate::watermark::users_with_watermarks;

/// Resources shared by one run. Opened at start, closed at the end.
#[derive(Debug, Clone)]
pub struct RunContext {
    config: Config,
    store: Store,
}

impl RunContext {
    /// Open the store named by `config.database_url`.
    pub async fn open(config: Config) -> IngestResult<Self> {
        let store = Store::open(&config.database_url).await?;
        Ok(Self { config, store })
    }

    pub fn from_parts(config: Config, store: Store) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}

/// How a single user's run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UserStatus {
    Ingested {
        posts: usize,
        brands: usize,
    },
    NoNewPosts,
    WatermarkFailed {
        error: String,
    },
    CrawlFailed {
        error: String,
    },
    /// Shutdown stopped the crawl before it finished
    Cancelled,
    /// Batch rolled back
    IngestFailed {
        error: String,
    },
}

impl UserStatus {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::WatermarkFailed { .. } | Self::CrawlFailed { .. } | Self::IngestFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserReport {
    pub user_id: i64,
    pub external_user_id: String,
    #[serde(flatten)]
    pub status: UserStatus,
}

impl UserReport {
    fn new(user: &User, status: UserStatus) -> Self {
        Self {
            user_id: user.id,
            external_user_id: user.external_user_id.clone(),
            status,
        }
    }
}

/// Totals of one run plus the per-user outcomes, ordered by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub users: usize,
    pub posts_inserted: usize,
    pub brands_created: usize,
    pub failed_users: usize,
    pub reports: Vec<UserReport>,
}

impl RunSummary {
    fn record(&mut self, report: UserReport) {
        self.users += 1;
        if let UserStatus::Ingested { posts, brands } = report.status {
            self.posts_inserted += posts;
            self.brands_created += brands;
        }
        if report.status.is_failure() {
            self.failed_users += 1;
        }
        self.reports.push(report);
    }

    pub fn report_for(&self, external_user_id: &str) -> Option<&UserReport> {
        self.reports
            .iter()
            .find(|r| r.external_user_id == external_user_id)
    }
}

/// Crawl every stored user's feed and persist what is new.
///
/// Per-user failures are logged and reported in the summary; only failing to
/// list users at all is an error. After `shutdown` fires no new page fetches
/// start, but crawls that already finished are still persisted.
pub async fn run(
    ctx: &RunContext,
    fetcher: Arc<dyn PageFetcher>,
    shutdown: CancellationToken,
    now: DateTime<FixedOffset>,
) -> IngestResult<RunSummary> {
    let pool = ctx.store().pool();
    let mut summary = RunSummary::default();

    let mut jobs = Vec::new();
    for (user, watermark) in users_with_watermarks(now, pool).await? {
        match watermark {
            Ok(watermark) => jobs.push(FeedJob { user, watermark }),
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Failed to read watermark, skipping user");
                summary.record(UserReport::new(
                    &user,
                    UserStatus::WatermarkFailed {
                        error: e.to_string(),
                    },
                ));
            }
        }
    }

    info!(
        users = jobs.len(),
        concurrency = ctx.config().fetch_concurrency,
        "Starting crawl"
    );

    let paginator = Paginator::new(fetcher, PaginatorConfig::from(ctx.config())).with_shutdown(shutdown);
    let scheduler = CrawlScheduler::new(Arc::new(paginator), ctx.config().fetch_concurrency);
    let mut results = scheduler.spawn(jobs);

    while let Some(crawl) = results.next().await {
        let report = collect(crawl, now, ctx).await;
        summary.record(report);
    }

    summary.reports.sort_by_key(|r| r.user_id);

    info!(
        users = summary.users,
        posts_inserted = summary.posts_inserted,
        brands_created = summary.brands_created,
        failed_users = summary.failed_users,
        "Run finished"
    );

    Ok(summary)
}

/// Persist one finished crawl.
async fn collect(crawl: UserCrawl, now: DateTime<FixedOffset>, ctx: &RunContext) -> UserReport {
    let UserCrawl {
        user,
        watermark,
        outcome,
    } = crawl;

    let posts = match outcome {
        Ok(posts) => posts,
        Err(CrawlError::Cancelled) => {
            warn!(user_id = %user.id, "Crawl cancelled");
            return UserReport::new(&user, UserStatus::Cancelled);
        }
        Err(e) => {
            error!(user_id = %user.id, url = %user.url, error = %e, "Crawl failed");
            return UserReport::new(
                &user,
                UserStatus::CrawlFailed {
                    error: e.to_string(),
                },
            );
        }
    };

    if posts.is_empty() {
        info!(user_id = %user.id, user = %user.label(), watermark = %watermark, "No new posts");
        return UserReport::new(&user, UserStatus::NoNewPosts);
    }

    match ingest_batch(user.id, &posts, now, ctx.store().pool()).await {
        Ok(BatchOutcome {
            posts_inserted,
            brands_created,
        }) => {
            info!(
                user_id = %user.id,
                user = %user.label(),
                posts_inserted = posts_inserted,
                brands_created = brands_created,
                "Ingested posts"
            );
            UserReport::new(
                &user,
                UserStatus::Ingested {
                    posts: posts_inserted,
                    brands: brands_created,
                },
            )
        }
        Err(e) => {
            error!(user_id = %user.id, error = %e, "Ingestion failed, batch rolled back");
            UserReport::new(
                &user,
                UserStatus::IngestFailed {
                    error: e.to_string(),
                },
            )
        }
    }
}
