//! Roster file loading and sync into storage.

use serde::{Deserialize, Deserializer};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{IngestResult, RosterError};
use crate::models::User;

/// One tracked account as listed in the roster file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterEntry {
    /// Position in the roster file; informational only
    #[serde(rename = "Id", default)]
    pub id: Option<i64>,

    #[serde(rename = "YahooId")]
    pub external_user_id: String,

    #[serde(rename = "DisplayName", default, deserialize_with = "empty_as_none")]
    pub display_name: Option<String>,

    /// Listing feed URL
    #[serde(rename = "Url")]
    pub url: String,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|name| !name.trim().is_empty()))
}

/// Parse a roster document (a JSON array of entries).
pub fn parse_roster(json: &str, source: &str) -> Result<Vec<RosterEntry>, RosterError> {
    serde_json::from_str(json).map_err(|source_err| RosterError::Json {
        path: source.to_string(),
        source: source_err,
    })
}

/// Read and parse the roster file at `path`.
pub async fn load_roster(path: impl AsRef<Path>) -> Result<Vec<RosterEntry>, RosterError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RosterError::Io {
            path: path_str.clone(),
            source,
        })?;

    let entries = parse_roster(&json, &path_str)?;
    debug!(path = %path_str, entries = entries.len(), "Loaded roster");
    Ok(entries)
}

/// Insert every roster entry not yet stored, in one transaction.
///
/// Existing users are left untouched. Returns how many users were added.
pub async fn sync_roster(entries: &[RosterEntry], pool: &SqlitePool) -> IngestResult<usize> {
    let mut tx = pool.begin().await?;
    let mut added = 0;

    for entry in entries {
        if User::find_by_external_id(&entry.external_user_id, &mut *tx)
            .await?
            .is_some()
        {
            continue;
        }

        let user = User::create(
            &entry.external_user_id,
            entry.display_name.as_deref(),
            &entry.url,
            &mut *tx,
        )
        .await?;
        debug!(user_id = %user.id, external_user_id = %user.external_user_id, "Added user");
        added += 1;
    }

    tx.commit().await?;

    info!(roster = entries.len(), added = added, "Roster synced");
    Ok(added)
}
