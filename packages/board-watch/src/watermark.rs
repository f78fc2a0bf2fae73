//! Per-user ingestion cutoff derived from stored post history.

use chrono::{DateTime, FixedOffset};
use sqlx::SqliteExecutor;

use crate::error::IngestResult;
use crate::models::{Post, User};
use crate::timestamp;

/// Turn a raw `MAX(post_time)` into a watermark.
///
/// Users without posts get a one-year backfill window ending at `now`.
pub fn resolve(last_post_time: Option<&str>, now: DateTime<FixedOffset>) -> IngestResult<DateTime<FixedOffset>> {
    match last_post_time {
        Some(value) if !value.is_empty() => timestamp::from_storage(value, *now.offset()),
        _ => Ok(timestamp::one_year_before(now)),
    }
}

/// Watermark of a single user, in `now`'s time zone.
pub async fn watermark_for_user<'e>(
    user_id: i64,
    now: DateTime<FixedOffset>,
    executor: impl SqliteExecutor<'e>,
) -> IngestResult<DateTime<FixedOffset>> {
    let last = Post::last_post_time(user_id, executor).await?;
    resolve(last.as_deref(), now)
}

/// All users with their watermark. A malformed stored timestamp only fails
/// that user's entry.
pub async fn users_with_watermarks<'e>(
    now: DateTime<FixedOffset>,
    executor: impl SqliteExecutor<'e>,
) -> IngestResult<Vec<(User, IngestResult<DateTime<FixedOffset>>)>> {
    let rows = User::list_with_last_post_time(executor).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let (user, last) = row.into_parts();
            let watermark = resolve(last.as_deref(), now);
            (user, watermark)
        })
        .collect())
}
