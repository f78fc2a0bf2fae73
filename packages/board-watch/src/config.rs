use anyhow::{Context, Result};
use chrono::FixedOffset;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Link text of the "next page" anchor on listing pages.
pub const DEFAULT_NEXT_PAGE_TEXT: &str = "次のページ";

/// Smallest accepted pause between two fetches of one feed.
pub const MIN_POLITE_DELAY: Duration = Duration::from_millis(1000);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Ingestion run configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub roster_path: PathBuf,
    /// Number of feeds crawled at the same time
    pub fetch_concurrency: usize,
    /// Wait after every page fetch of one feed
    pub polite_delay: Duration,
    pub fetch_timeout: Duration,
    /// Upper bound on pages followed within a single feed
    pub max_pages: usize,
    /// Time zone the site prints its dates in
    pub site_offset: FixedOffset,
    pub next_page_text: String,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data.db?mode=rwc".to_string(),
            roster_path: PathBuf::from("./users.json"),
            fetch_concurrency: 3,
            polite_delay: Duration::from_millis(1100),
            fetch_timeout: Duration::from_secs(30),
            max_pages: 200,
            site_offset: jst(),
            next_page_text: DEFAULT_NEXT_PAGE_TEXT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();

        let fetch_concurrency: usize = parse_var("FETCH_CONCURRENCY", defaults.fetch_concurrency)?;
        if fetch_concurrency == 0 {
            return Err(ConfigError {
                key: "FETCH_CONCURRENCY",
                value: "0".to_string(),
            })
            .context("FETCH_CONCURRENCY must be at least 1");
        }

        let site_offset = match env::var("SITE_UTC_OFFSET") {
            Ok(raw) => parse_offset(&raw).context("SITE_UTC_OFFSET must look like +09:00")?,
            Err(_) => defaults.site_offset,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            roster_path: env::var("ROSTER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.roster_path),
            fetch_concurrency,
            polite_delay: polite_delay(parse_var("POLITE_DELAY_MS", 1100u64)?)
                .context("POLITE_DELAY_MS must be at least 1000")?,
            fetch_timeout: Duration::from_secs(parse_var("FETCH_TIMEOUT_SECS", 30u64)?),
            max_pages: parse_var("MAX_PAGES_PER_FEED", defaults.max_pages)?,
            site_offset,
            next_page_text: env::var("NEXT_PAGE_TEXT").unwrap_or(defaults.next_page_text),
            user_agent: env::var("USER_AGENT").unwrap_or(defaults.user_agent),
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError { key, value: raw.clone() })
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

/// Validate the configured fetch pause. It can be raised but never skipped.
pub fn polite_delay(millis: u64) -> std::result::Result<Duration, ConfigError> {
    let delay = Duration::from_millis(millis);
    if delay < MIN_POLITE_DELAY {
        return Err(ConfigError {
            key: "POLITE_DELAY_MS",
            value: millis.to_string(),
        });
    }
    Ok(delay)
}

/// Parse a `+HH:MM` / `-HH:MM` UTC offset.
pub fn parse_offset(raw: &str) -> std::result::Result<FixedOffset, ConfigError> {
    FixedOffset::from_str(raw.trim()).map_err(|_| ConfigError {
        key: "SITE_UTC_OFFSET",
        value: raw.to_string(),
    })
}

/// The site's default time zone (+09:00).
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("+09:00 is a valid offset")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fetch_concurrency, 3);
        assert_eq!(config.polite_delay, Duration::from_millis(1100));
        assert_eq!(config.site_offset.local_minus_utc(), 9 * 3600);
        assert_eq!(config.next_page_text, "次のページ");
    }

    #[test]
    fn test_polite_delay_floor() {
        assert_eq!(polite_delay(1000).unwrap(), MIN_POLITE_DELAY);
        assert_eq!(polite_delay(1500).unwrap(), Duration::from_millis(1500));

        let err = polite_delay(0).unwrap_err();
        assert_eq!(err.key, "POLITE_DELAY_MS");
        assert_eq!(err.value, "0");
        assert!(polite_delay(999).is_err());
    }

    #[test]
    fn test_from_env_rejects_zero_polite_delay() {
        // Only test in the crate that touches the process environment
        env::set_var("POLITE_DELAY_MS", "0");
        let result = Config::from_env();
        env::remove_var("POLITE_DELAY_MS");

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("+09:00").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(parse_offset(" -05:30 ").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert!(parse_offset("JST").is_err());
    }
}
