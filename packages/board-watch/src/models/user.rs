use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::error::IngestResult;

/// A tracked account on the board. Created by roster sync, read-only for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub external_user_id: String,
    pub display_name: Option<String>,
    /// Listing feed of the user's posts
    pub url: String,
}

/// User joined with the latest stored `post_time` (raw storage text).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserPostTimeRow {
    pub id: i64,
    pub external_user_id: String,
    pub display_name: Option<String>,
    pub url: String,
    pub last_post_time: Option<String>,
}

impl UserPostTimeRow {
    pub fn into_parts(self) -> (User, Option<String>) {
        (
            User {
                id: self.id,
                external_user_id: self.external_user_id,
                display_name: self.display_name,
                url: self.url,
            },
            self.last_post_time,
        )
    }
}

impl User {
    /// Display name, falling back to the external id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.external_user_id)
    }

    pub async fn find_by_external_id<'e>(
        external_user_id: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<Option<Self>> {
        sqlx::query_as::<_, Self>(r#"SELECT * FROM "user" WHERE external_user_id = ?"#)
            .bind(external_user_id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn create<'e>(
        external_user_id: &str,
        display_name: Option<&str>,
        url: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO "user" (external_user_id, display_name, url)
            VALUES (?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(external_user_id)
        .bind(display_name)
        .bind(url)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn list<'e>(executor: impl SqliteExecutor<'e>) -> IngestResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(r#"SELECT * FROM "user" ORDER BY id"#)
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }

    /// All users with the max `post_time` of their stored posts, in one query.
    pub async fn list_with_last_post_time<'e>(
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<Vec<UserPostTimeRow>> {
        sqlx::query_as::<_, UserPostTimeRow>(
            r#"
            SELECT u.id, u.external_user_id, u.display_name, u.url, p.last_post_time
            FROM "user" u
            LEFT JOIN (
                SELECT user_id, MAX(post_time) AS last_post_time
                FROM post
                GROUP BY user_id
            ) p ON u.id = p.user_id
            ORDER BY u.id ASC
            "#,
        )
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }
}
