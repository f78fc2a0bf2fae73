//! Atomic persistence of one user's newly discovered posts.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::extractor::PostRecord;
use crate::models::{Brand, BrandNotification, NewPost, Post, PostNotification};

/// What one committed batch added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub posts_inserted: usize,
    pub brands_created: usize,
}

/// Store a user's new posts in a single transaction.
///
/// For every post: resolve its brand by name (creating the brand and its
/// "new" marker when unseen), insert the post, and mark it unread. Posts are
/// written oldest first. If any step fails the transaction is dropped without
/// commit and nothing from the batch is visible.
///
/// `now` stamps the brand notifications.
pub async fn ingest_batch(
    user_id: i64,
    posts: &[PostRecord],
    now: DateTime<FixedOffset>,
    pool: &SqlitePool,
) -> IngestResult<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    if posts.is_empty() {
        return Ok(outcome);
    }

    let mut tx = pool.begin().await?;

    for post in posts.iter().rev() {
        if post.brand_name.is_empty() {
            return Err(IngestError::EmptyBrandName);
        }

        let brand = match Brand::find_by_name(&post.brand_name, &mut *tx).await? {
            Some(brand) => brand,
            None => {
                let brand = Brand::create(&post.brand_name, &post.brand_url, &mut *tx).await?;
                BrandNotification::create(brand.id, now, &mut *tx).await?;
                debug!(brand_id = brand.id, brand_name = %brand.brand_name, "Created brand");
                outcome.brands_created += 1;
                brand
            }
        };

        let post_id = Post::create(
            &NewPost {
                user_id,
                brand_id: brand.id,
                comment_no: &post.comment_no,
                title: &post.title,
                url: &post.url,
                ref_no: post.reference.as_ref().map(|r| r.no.as_str()),
                ref_url: post.reference.as_ref().map(|r| r.url.as_str()),
                detail: &post.detail,
                post_time: post.post_time,
            },
            &mut *tx,
        )
        .await?;

        PostNotification::create(post_id, &mut *tx).await?;
        outcome.posts_inserted += 1;
    }

    tx.commit().await?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Reference;
    use crate::models::User;
    use crate::store::{Store, MAX_DETAIL_CHARS};
    use crate::testing::jst;
    use chrono::TimeZone;

    fn record(brand: &str, no: &str, day: u32) -> PostRecord {
        PostRecord {
            brand_name: brand.to_string(),
            brand_url: format!("https://board.example/brands/{}", no),
            comment_no: no.to_string(),
            title: format!("Comment {}", no),
            url: format!("https://board.example/comments/{}", no),
            reference: None,
            detail: "detail".to_string(),
            post_time: jst().with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
        }
    }

    fn now() -> DateTime<FixedOffset> {
        jst().with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    async fn setup() -> (Store, User) {
        let store = Store::in_memory().await.unwrap();
        let user = User::create("alice", Some("Alice"), "https://board.example/alice", store.pool())
            .await
            .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn test_same_brand_created_once() {
        let (store, user) = setup().await;
        let posts = vec![record("Brand X", "2", 3), record("Brand X", "1", 2)];

        let outcome = ingest_batch(user.id, &posts, now(), store.pool()).await.unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                posts_inserted: 2,
                brands_created: 1
            }
        );
        let brands = Brand::list(store.pool()).await.unwrap();
        assert_eq!(brands.len(), 1);
        assert_eq!(brands[0].brand_name, "Brand X");
        // The first post written (the oldest) supplies the canonical URL
        assert_eq!(brands[0].url, "https://board.example/brands/1");

        let notifications = BrandNotification::list(store.pool()).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].post_time, "2024-01-31 15:00:00");

        assert_eq!(PostNotification::list(store.pool()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_brand_gets_no_new_notification() {
        let (store, user) = setup().await;
        Brand::create("Brand X", "https://board.example/x", store.pool())
            .await
            .unwrap();

        let outcome = ingest_batch(user.id, &[record("Brand X", "1", 2)], now(), store.pool())
            .await
            .unwrap();

        assert_eq!(outcome.brands_created, 0);
        assert!(BrandNotification::list(store.pool()).await.unwrap().is_empty());
        assert_eq!(PostNotification::list(store.pool()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_posts_written_oldest_first_with_reference() {
        let (store, user) = setup().await;
        let mut newest = record("Brand Y", "3", 4);
        newest.reference = Some(Reference {
            no: "1".to_string(),
            url: "https://board.example/comments/1".to_string(),
        });
        let posts = vec![newest, record("Brand X", "2", 3), record("Brand X", "1", 2)];

        ingest_batch(user.id, &posts, now(), store.pool()).await.unwrap();

        let stored = Post::list_for_user(user.id, store.pool()).await.unwrap();
        let numbers: Vec<&str> = stored.iter().map(|p| p.comment_no.as_str()).collect();
        assert_eq!(numbers, vec!["1", "2", "3"]);
        assert!(stored.windows(2).all(|w| w[0].id < w[1].id));

        assert_eq!(stored[2].ref_no.as_deref(), Some("1"));
        assert_eq!(stored[2].ref_url.as_deref(), Some("https://board.example/comments/1"));
        assert_eq!(stored[0].ref_no, None);
        assert_eq!(
            stored[2].post_time_in(jst()).unwrap(),
            jst().with_ymd_and_hms(2024, 1, 4, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_whole_batch() {
        let (store, user) = setup().await;
        let earlier = ingest_batch(user.id, &[record("Brand W", "0", 1)], now(), store.pool())
            .await
            .unwrap();
        assert_eq!(earlier.posts_inserted, 1);

        let brands_before = Brand::list(store.pool()).await.unwrap();
        let brand_notifications_before = BrandNotification::list(store.pool()).await.unwrap();
        let post_notifications_before = PostNotification::list(store.pool()).await.unwrap();
        assert_eq!(brand_notifications_before.len(), 1);
        assert_eq!(post_notifications_before.len(), 1);

        let mut broken = record("Brand Y", "2", 3);
        broken.detail = "x".repeat(MAX_DETAIL_CHARS + 1);
        let posts = vec![record("Brand Z", "3", 4), broken, record("Brand W", "1", 2)];

        let err = ingest_batch(user.id, &posts, now(), store.pool()).await.unwrap_err();
        assert!(matches!(err, IngestError::Database(_)));

        assert_eq!(Post::count(store.pool()).await.unwrap(), 1);
        assert_eq!(Brand::list(store.pool()).await.unwrap(), brands_before);
        assert_eq!(
            BrandNotification::list(store.pool()).await.unwrap(),
            brand_notifications_before
        );
        assert_eq!(
            PostNotification::list(store.pool()).await.unwrap(),
            post_notifications_before
        );
    }

    #[tokio::test]
    async fn test_empty_brand_name_rejected() {
        let (store, user) = setup().await;
        let posts = vec![record("", "2", 3), record("Brand X", "1", 2)];

        let err = ingest_batch(user.id, &posts, now(), store.pool()).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyBrandName));
        assert_eq!(Post::count(store.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (store, user) = setup().await;
        let outcome = ingest_batch(user.id, &[], now(), store.pool()).await.unwrap();
        assert_eq!(outcome, BatchOutcome::default());
    }
}
