// Common test utilities
#![allow(dead_code)]

use board_watch::models::{Brand, NewPost, Post, User};
use board_watch::testing::{jst, StaticFetcher};
use board_watch::{Config, RunContext, Store};
use chrono::{DateTime, FixedOffset, TimeZone};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store plus a canned fetcher, wired into a run context.
pub struct TestHarness {
    pub ctx: RunContext,
    pub fetcher: Arc<StaticFetcher>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_fetcher(StaticFetcher::new()).await
    }

    pub async fn with_fetcher(fetcher: StaticFetcher) -> Self {
        // Run with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let store = Store::in_memory().await.expect("Failed to open in-memory store");
        let config = Config {
            polite_delay: Duration::ZERO,
            ..Config::default()
        };

        Self {
            ctx: RunContext::from_parts(config, store),
            fetcher: Arc::new(fetcher),
        }
    }

    /// Adjust the run configuration, keeping the same store.
    pub fn configure(&mut self, update: impl FnOnce(&mut Config)) {
        let mut config = self.ctx.config().clone();
        update(&mut config);
        self.ctx = RunContext::from_parts(config, self.ctx.store().clone());
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.ctx.store().pool()
    }
}

/// Feed URL of a test user.
pub fn feed_url(external_user_id: &str) -> String {
    format!("https://board.example/user/{}/comments", external_user_id)
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    jst()
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}

pub async fn create_user(harness: &TestHarness, external_user_id: &str) -> User {
    User::create(external_user_id, None, &feed_url(external_user_id), harness.pool())
        .await
        .expect("Failed to create user")
}

/// Store a post for `user` directly, bypassing ingestion, to set a watermark.
pub async fn seed_post(harness: &TestHarness, user: &User, post_time: DateTime<FixedOffset>) {
    let brand = match Brand::find_by_name("Seed Brand", harness.pool()).await.unwrap() {
        Some(brand) => brand,
        None => Brand::create("Seed Brand", "https://board.example/brands/seed", harness.pool())
            .await
            .unwrap(),
    };

    Post::create(
        &NewPost {
            user_id: user.id,
            brand_id: brand.id,
            comment_no: "0",
            title: "seed",
            url: "https://board.example/comments/0",
            ref_no: None,
            ref_url: None,
            detail: "",
            post_time,
        },
        harness.pool(),
    )
    .await
    .expect("Failed to seed post");
}
