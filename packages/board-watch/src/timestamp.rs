//! Timestamp formats used on disk and on listing pages.
//!
//! Storage keeps `YYYY-MM-DD hh:mm:ss` in UTC so that `MAX(post_time)` orders
//! correctly as text. Everything the engine works with is converted to the
//! site's fixed offset at read time.

use chrono::{DateTime, FixedOffset, Months, NaiveDateTime, TimeZone, Utc};

use crate::error::{IngestError, IngestResult};

/// On-disk pattern, always UTC.
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Pattern the listing pages print post dates in (site local time).
pub const LISTING_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Format an instant for storage.
pub fn to_storage<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    time.with_timezone(&Utc).format(STORAGE_FORMAT).to_string()
}

/// Parse a stored UTC timestamp and convert it to `tz`.
pub fn from_storage(value: &str, tz: FixedOffset) -> IngestResult<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), STORAGE_FORMAT).map_err(|source| {
        IngestError::MalformedTimestamp {
            value: value.to_string(),
            source,
        }
    })?;

    Ok(Utc.from_utc_datetime(&naive).with_timezone(&tz))
}

/// Parse a listing date (`yyyy/mm/dd hh:mm`) interpreted in the site's zone.
pub fn parse_listing(text: &str, tz: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), LISTING_FORMAT).ok()?;
    tz.from_local_datetime(&naive).single()
}

/// Backfill horizon for users that have never been crawled.
pub fn one_year_before(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now.checked_sub_months(Months::new(12)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn test_storage_is_utc() {
        let local = jst().with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        assert_eq!(to_storage(&local), "2024-01-02 00:00:00");

        let back = from_storage("2024-01-02 00:00:00", jst()).unwrap();
        assert_eq!(back, local);
        assert_eq!(back.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_malformed_storage_value() {
        let err = from_storage("2024/01/02 00:00", jst()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedTimestamp { ref value, .. } if value == "2024/01/02 00:00"));
    }

    #[test]
    fn test_parse_listing() {
        let parsed = parse_listing(" 2024/01/02 09:00\n", jst()).unwrap();
        assert_eq!(parsed, jst().with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
        assert!(parse_listing("2024-01-02 09:00", jst()).is_none());
        assert!(parse_listing("", jst()).is_none());
    }

    #[test]
    fn test_one_year_before() {
        let now = jst().with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(
            one_year_before(now),
            jst().with_ymd_and_hms(2023, 3, 15, 12, 0, 0).unwrap()
        );
    }
}
