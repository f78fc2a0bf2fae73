//! Bounded-concurrency crawling of many feeds.
//!
//! Each feed runs in its own task, but a task must hold one of N fetcher
//! permits while it crawls. The permit is returned as soon as the crawl
//! ends, before the result is consumed, so only network I/O is throttled.
//! Results come back in completion order. A panicking crawl still yields a
//! result for its user.

use chrono::{DateTime, FixedOffset};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{CrawlError, CrawlResult};
use crate::extractor::PostRecord;
use crate::models::User;
use crate::paginator::Paginator;

/// Default number of feeds crawled at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// One feed to crawl.
#[derive(Debug, Clone)]
pub struct FeedJob {
    pub user: User,
    pub watermark: DateTime<FixedOffset>,
}

/// Finished crawl of one feed.
#[derive(Debug)]
pub struct UserCrawl {
    pub user: User,
    pub watermark: DateTime<FixedOffset>,
    pub outcome: CrawlResult<Vec<PostRecord>>,
}

pub struct CrawlScheduler {
    paginator: Arc<Paginator>,
    permits: Arc<Semaphore>,
}

impl CrawlScheduler {
    pub fn new(paginator: Arc<Paginator>, concurrency: usize) -> Self {
        Self {
            paginator,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Start crawling every job. Must be called inside a Tokio runtime.
    pub fn spawn(&self, jobs: Vec<FeedJob>) -> CrawlResults {
        let mut tasks = JoinSet::new();

        for job in jobs {
            let paginator = self.paginator.clone();
            let permits = self.permits.clone();

            tasks.spawn(async move {
                let FeedJob { user, watermark } = job;

                let outcome = match permits.acquire_owned().await {
                    Ok(permit) => {
                        debug!(user_id = %user.id, "Fetcher permit acquired");
                        let outcome = AssertUnwindSafe(paginator.crawl(&user.url, watermark))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| {
                                let message = panic_message(&*panic);
                                error!(user_id = %user.id, panic = %message, "Crawl panicked");
                                Err(CrawlError::Panicked(message))
                            });
                        drop(permit);
                        outcome
                    }
                    Err(_) => Err(CrawlError::Cancelled),
                };

                UserCrawl {
                    user,
                    watermark,
                    outcome,
                }
            });
        }

        CrawlResults { tasks }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Crawl results, yielded in completion order.
pub struct CrawlResults {
    tasks: JoinSet<UserCrawl>,
}

impl CrawlResults {
    /// Next finished crawl, or `None` once every task has finished.
    pub async fn next(&mut self) -> Option<UserCrawl> {
        loop {
            match self.tasks.join_next().await? {
                Ok(crawl) => return Some(crawl),
                Err(e) => error!(error = %e, "Crawl task failed"),
            }
        }
    }

    /// Crawls not yet collected.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
