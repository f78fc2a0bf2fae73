//! Walks one user's listing feed page by page until the watermark.

use chrono::{DateTime, FixedOffset};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{CrawlError, CrawlResult, FetchError};
use crate::extractor::{extract_page, PostRecord};
use crate::fetcher::PageFetcher;

#[derive(Debug, Clone)]
pub struct PaginatorConfig {
    /// Wait after every fetch before the next one (or before returning)
    pub polite_delay: Duration,
    pub max_pages: usize,
    pub next_page_text: String,
    pub site_offset: FixedOffset,
}

impl From<&Config> for PaginatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            polite_delay: config.polite_delay,
            max_pages: config.max_pages,
            next_page_text: config.next_page_text.clone(),
            site_offset: config.site_offset,
        }
    }
}

/// Sequential crawler for a single feed.
pub struct Paginator {
    fetcher: Arc<dyn PageFetcher>,
    config: PaginatorConfig,
    shutdown: CancellationToken,
}

impl Paginator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: PaginatorConfig) -> Self {
        Self {
            fetcher,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop issuing fetches once `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Collect every post newer than `watermark`, newest first.
    ///
    /// The crawl only succeeds once the watermark or the last page is
    /// reached. A fetch failure, the page cap, or a looping next-page link
    /// aborts the whole feed: a partial list would move the watermark past
    /// posts that were never seen.
    pub async fn crawl(
        &self,
        feed_url: &str,
        watermark: DateTime<FixedOffset>,
    ) -> CrawlResult<Vec<PostRecord>> {
        let mut url = Url::parse(feed_url).map_err(|_| FetchError::InvalidUrl {
            url: feed_url.to_string(),
        })?;

        let mut posts = Vec::new();
        let mut visited = HashSet::new();

        for page_no in 1..=self.config.max_pages {
            if self.shutdown.is_cancelled() {
                info!(url = %url, "Shutdown requested, abandoning feed");
                return Err(CrawlError::Cancelled);
            }

            visited.insert(url.clone());
            let html = self.fetcher.fetch(&url).await?;

            let page = extract_page(
                &html,
                url.clone(),
                watermark,
                self.config.site_offset,
                &self.config.next_page_text,
            );

            debug!(
                url = %url,
                page_no = page_no,
                new_posts = page.posts.len(),
                skipped = page.skipped.len(),
                cutoff_reached = page.cutoff_reached,
                "Extracted listing page"
            );

            posts.extend(page.posts);

            tokio::time::sleep(self.config.polite_delay).await;

            if page.cutoff_reached {
                return Ok(posts);
            }

            match page.next_page {
                Some(next) if visited.contains(&next) => {
                    warn!(url = %next, "Next page already visited, abandoning feed");
                    return Err(CrawlError::Cycle {
                        url: next.to_string(),
                    });
                }
                Some(next) => url = next,
                None => return Ok(posts),
            }
        }

        warn!(
            feed_url = %feed_url,
            max_pages = self.config.max_pages,
            "Page limit reached before the watermark, abandoning feed"
        );
        Err(CrawlError::PageLimit {
            pages: self.config.max_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::MockPageFetcher;
    use crate::testing::{jst, listing_html, ListingItemFixture, StaticFetcher};
    use chrono::TimeZone;
    use mockall::Sequence;

    const FEED: &str = "https://board.example/user/alice/comments";

    fn config() -> PaginatorConfig {
        PaginatorConfig {
            polite_delay: Duration::ZERO,
            max_pages: 10,
            next_page_text: "次のページ".to_string(),
            site_offset: jst(),
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        jst().with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_follows_next_page_until_cutoff() {
        let fetcher = StaticFetcher::new()
            .with_page(
                FEED,
                listing_html(
                    &[
                        ListingItemFixture::new("Brand X", "4", at(4, 0)),
                        ListingItemFixture::new("Brand Y", "3", at(3, 0)),
                    ],
                    Some("/user/alice/comments?page=2"),
                ),
            )
            .with_page(
                "https://board.example/user/alice/comments?page=2",
                listing_html(
                    &[
                        ListingItemFixture::new("Brand X", "2", at(2, 0)),
                        ListingItemFixture::new("Brand X", "1", at(1, 0)),
                    ],
                    Some("/user/alice/comments?page=3"),
                ),
            );
        let fetcher = Arc::new(fetcher);

        let paginator = Paginator::new(fetcher.clone(), config());
        let posts = paginator.crawl(FEED, at(1, 0)).await.unwrap();

        let numbers: Vec<&str> = posts.iter().map(|p| p.comment_no.as_str()).collect();
        assert_eq!(numbers, vec!["4", "3", "2"]);
        assert_eq!(
            fetcher.calls(),
            vec![
                FEED.to_string(),
                "https://board.example/user/alice/comments?page=2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stops_without_next_page() {
        let fetcher = Arc::new(StaticFetcher::new().with_page(
            FEED,
            listing_html(&[ListingItemFixture::new("Brand X", "1", at(2, 0))], None),
        ));

        let posts = Paginator::new(fetcher.clone(), config())
            .crawl(FEED, at(1, 0))
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cutoff_does_not_request_next_page() {
        let mut mock = MockPageFetcher::new();
        let html = listing_html(
            &[
                ListingItemFixture::new("Brand X", "2", at(2, 9)),
                ListingItemFixture::new("Brand X", "1", at(1, 8)),
            ],
            Some("/user/alice/comments?page=2"),
        );
        mock.expect_fetch()
            .withf(|url| url.as_str() == FEED)
            .times(1)
            .returning(move |_| Ok(html.clone()));

        let posts = Paginator::new(Arc::new(mock), config())
            .crawl(FEED, at(1, 10))
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].comment_no, "2");
    }

    #[tokio::test]
    async fn test_fetch_failure_discards_collected_posts() {
        let mut mock = MockPageFetcher::new();
        let mut seq = Sequence::new();
        let first = listing_html(
            &[ListingItemFixture::new("Brand X", "9", at(9, 0))],
            Some("/user/alice/comments?page=2"),
        );
        mock.expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(first.clone()));
        mock.expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|url| {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                })
            });

        let err = Paginator::new(Arc::new(mock), config())
            .crawl(FEED, at(1, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Fetch(FetchError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_invalid_feed_url() {
        let paginator = Paginator::new(Arc::new(StaticFetcher::new()), config());
        let err = paginator.crawl("not a url", at(1, 0)).await.unwrap_err();
        assert!(matches!(err, CrawlError::Fetch(FetchError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_fetch() {
        let fetcher = Arc::new(StaticFetcher::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = Paginator::new(fetcher.clone(), config())
            .with_shutdown(token)
            .crawl(FEED, at(1, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Cancelled));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_next_page_cycle_fails_the_feed() {
        let fetcher = Arc::new(StaticFetcher::new().with_page(
            FEED,
            listing_html(
                &[ListingItemFixture::new("Brand X", "1", at(2, 0))],
                Some("/user/alice/comments"),
            ),
        ));

        let err = Paginator::new(fetcher.clone(), config())
            .crawl(FEED, at(1, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Cycle { ref url } if url == FEED));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_page_limit_before_watermark_fails_the_feed() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .with_page(
                    FEED,
                    listing_html(
                        &[ListingItemFixture::new("Brand X", "4", at(4, 0))],
                        Some("/user/alice/comments?page=2"),
                    ),
                )
                .with_page(
                    "https://board.example/user/alice/comments?page=2",
                    listing_html(&[ListingItemFixture::new("Brand X", "3", at(3, 0))], None),
                ),
        );

        let err = Paginator::new(
            fetcher.clone(),
            PaginatorConfig {
                max_pages: 1,
                ..config()
            },
        )
        .crawl(FEED, at(1, 0))
        .await
        .unwrap_err();

        assert!(matches!(err, CrawlError::PageLimit { pages: 1 }));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_page_limit_not_hit_when_last_page_ends_feed() {
        let fetcher = Arc::new(StaticFetcher::new().with_page(
            FEED,
            listing_html(&[ListingItemFixture::new("Brand X", "4", at(4, 0))], None),
        ));

        let posts = Paginator::new(
            fetcher,
            PaginatorConfig {
                max_pages: 1,
                ..config()
            },
        )
        .crawl(FEED, at(1, 0))
        .await
        .unwrap();

        assert_eq!(posts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polite_delay_after_every_fetch() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .with_page(
                    FEED,
                    listing_html(
                        &[ListingItemFixture::new("Brand X", "2", at(3, 0))],
                        Some("/user/alice/comments?page=2"),
                    ),
                )
                .with_page(
                    "https://board.example/user/alice/comments?page=2",
                    listing_html(&[ListingItemFixture::new("Brand X", "1", at(2, 0))], None),
                ),
        );
        let paginator = Paginator::new(
            fetcher,
            PaginatorConfig {
                polite_delay: Duration::from_millis(1100),
                ..config()
            },
        );

        let started = tokio::time::Instant::now();
        let posts = paginator.crawl(FEED, at(1, 0)).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(2200));
    }
}
