//! SQLite storage bootstrap.
//!
//! Opens the pool and creates the schema when missing. Row access lives in
//! [`crate::models`].

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::IngestResult;

/// Maximum length of `post.detail`, in characters.
pub const MAX_DETAIL_CHARS: usize = 10_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "user" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_user_id TEXT NOT NULL,
    display_name TEXT,
    url TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_user_external_user_id ON "user"(external_user_id);

CREATE TABLE IF NOT EXISTS brand (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    brand_name TEXT NOT NULL,
    url TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_brand_brand_name ON brand(brand_name);

CREATE TABLE IF NOT EXISTS post (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES "user"(id),
    brand_id INTEGER NOT NULL REFERENCES brand(id),
    comment_no TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    ref_no TEXT,
    ref_url TEXT,
    detail TEXT NOT NULL CHECK (length(detail) <= 10000),
    post_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_post_user_post_time ON post(user_id, post_time);

CREATE TABLE IF NOT EXISTS brand_notification (
    brand_id INTEGER PRIMARY KEY REFERENCES brand(id),
    post_time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS post_notification (
    post_id INTEGER PRIMARY KEY REFERENCES post(id)
);
"#;

/// Handle on the ingestion database.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open a store at the given connection URL and create the schema.
    ///
    /// # Example URLs
    /// - `sqlite://data.db?mode=rwc` - File-based database, created if missing
    /// - `sqlite::memory:` - In-memory database (see [`Store::in_memory`])
    pub async fn open(database_url: &str) -> IngestResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// Every in-memory connection is its own database, so the pool is pinned
    /// to a single connection that is never recycled.
    pub async fn in_memory() -> IngestResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> IngestResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.run_migrations().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["brand", "brand_notification", "post", "post_notification", "user"]
        );
    }
}
