//! "New" markers for brands and "unread" markers for posts.
//!
//! The ingestion engine only creates these rows. Deleting them (on view or
//! after a retention window) belongs to the browsing side.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::error::IngestResult;
use crate::timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BrandNotification {
    pub brand_id: i64,
    /// When the brand was first seen, storage format (UTC)
    pub post_time: String,
}

impl BrandNotification {
    pub async fn create<'e>(
        brand_id: i64,
        seen_at: DateTime<FixedOffset>,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<()> {
        sqlx::query("INSERT INTO brand_notification (brand_id, post_time) VALUES (?, ?)")
            .bind(brand_id)
            .bind(timestamp::to_storage(&seen_at))
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn list<'e>(executor: impl SqliteExecutor<'e>) -> IngestResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM brand_notification ORDER BY brand_id")
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostNotification {
    pub post_id: i64,
}

impl PostNotification {
    pub async fn create<'e>(post_id: i64, executor: impl SqliteExecutor<'e>) -> IngestResult<()> {
        sqlx::query("INSERT INTO post_notification (post_id) VALUES (?)")
            .bind(post_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn list<'e>(executor: impl SqliteExecutor<'e>) -> IngestResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM post_notification ORDER BY post_id")
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }
}
