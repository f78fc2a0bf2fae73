use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::error::IngestResult;

/// A topic users post about. At most one row per name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Brand {
    pub id: i64,
    pub brand_name: String,
    pub url: String,
}

impl Brand {
    /// Find a brand by exact name
    pub async fn find_by_name<'e>(
        brand_name: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM brand WHERE brand_name = ?")
            .bind(brand_name)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn create<'e>(
        brand_name: &str,
        url: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> IngestResult<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO brand (brand_name, url)
            VALUES (?, ?)
            RETURNING *
            "#,
        )
        .bind(brand_name)
        .bind(url)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn list<'e>(executor: impl SqliteExecutor<'e>) -> IngestResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM brand ORDER BY id")
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }
}
