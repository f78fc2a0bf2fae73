use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::error::IngestResult;
use crate::timestamp;

/// A stored post. `post_time` is kept in storage format (UTC text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub brand_id: i64,
    pub comment_no: String,
    pub title: String,
    pub url: String,
    pub ref_no: Option<String>,
    pub ref_url: Option<String>,
    pub detail: String,
    pub post_time: String,
}

/// Insert payload for [`Post::create`].
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub user_id: i64,
    pub brand_id: i64,
    pub comment_no: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub ref_no: Option<&'a str>,
    pub ref_url: Option<&'a str>,
    pub detail: &'a str,
    pub post_time: DateTime<FixedOffset>,
}

impl Post {
    /// Post time converted to `tz`.
    pub fn post_time_in(&self, tz: FixedOffset) -> IngestResult<DateTime<FixedOffset>> {
        timestamp::from_storage(&self.post_time, tz)
    }

    /// Insert a post, returning its id
    pub async fn create<'e>(
        new_post: &NewPost<'_>,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO post (
                user_id, brand_id, comment_no, title, url, ref_no, ref_url, detail, post_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(new_post.user_id)
        .bind(new_post.brand_id)
        .bind(new_post.comment_no)
        .bind(new_post.title)
        .bind(new_post.url)
        .bind(new_post.ref_no)
        .bind(new_post.ref_url)
        .bind(new_post.detail)
        .bind(timestamp::to_storage(&new_post.post_time))
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    /// Posts of one user, oldest first
    pub async fn list_for_user<'e>(
        user_id: i64,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM post WHERE user_id = ? ORDER BY post_time, id")
            .bind(user_id)
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn count<'e>(executor: impl SqliteExecutor<'e>) -> IngestResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post")
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    /// Raw `MAX(post_time)` for one user, `None` when the user has no posts
    pub async fn last_post_time<'e>(
        user_id: i64,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<Option<String>> {
        let (value,): (Option<String>,) =
            sqlx::query_as("SELECT MAX(post_time) FROM post WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(executor)
                .await?;
        Ok(value)
    }
}
