/// Outlook freshness.
///
/// SPC reissues the day 1 outlook several times a day. A scan built on an
/// outlook that stopped updating looks exactly like a quiet day, so the
/// pipeline reports when the newest product it saw was issued and warns
/// once that age passes the configured limit.
///
/// # Clock injection
/// Functions take `now: DateTime<Utc>` rather than calling `Utc::now()`,
/// which keeps the age arithmetic deterministic in tests.

use chrono::{DateTime, Utc};

use crate::model::CatError;

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// Parses an HTTP date header (`Last-Modified` / `Date`), which is RFC 2822.
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>, CatError> {
    DateTime::parse_from_rfc2822(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatError::Parse(format!("bad HTTP date {:?}: {}", value, e)))
}

/// Newest parseable timestamp among `headers`. Unparseable values are
/// skipped; `None` when nothing parses.
pub fn latest_update<'a, I>(headers: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a str>,
{
    headers
        .into_iter()
        .filter_map(|h| parse_http_date(h).ok())
        .max()
}

// ---------------------------------------------------------------------------
// Age
// ---------------------------------------------------------------------------

/// Whole minutes between `latest` and `now`, floored at zero for clocks
/// that run slightly ahead of ours.
pub fn age_minutes(latest: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - latest).num_minutes().max(0) as u64
}

/// `"HH:MM UTC (Xh Ym ago)"`, or `"HH:MM UTC (Ym ago)"` under an hour.
pub fn describe_freshness_at(latest: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = age_minutes(latest, now);
    let (hours, minutes) = (age / 60, age % 60);
    let clock = latest.format("%H:%M UTC");
    if hours > 0 {
        format!("{} ({}h {}m ago)", clock, hours, minutes)
    } else {
        format!("{} ({}m ago)", clock, minutes)
    }
}

/// Stale means strictly older than `max_age_minutes`.
///
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
pub fn is_stale_at(latest: DateTime<Utc>, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    age_minutes(latest, now) > max_age_minutes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Fixed "now" for every test: 2026-04-27 20:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 27, 20, 0, 0).unwrap()
    }

    // --- Header parsing ------------------------------------------------------

    #[test]
    fn test_rfc2822_header_parses_to_utc() {
        let dt = parse_http_date("Mon, 27 Apr 2026 16:30:00 GMT").expect("valid HTTP date");
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 4, 27, 16, 30, 0).unwrap());
    }

    #[test]
    fn test_garbage_header_is_a_parse_error() {
        let result = parse_http_date("yesterday-ish");
        assert!(matches!(result, Err(CatError::Parse(_))), "got {:?}", result);
    }

    #[test]
    fn test_latest_update_picks_newest_and_skips_bad_values() {
        let headers = [
            "Mon, 27 Apr 2026 12:00:00 GMT",
            "not a date",
            "Mon, 27 Apr 2026 16:30:00 GMT",
            "Mon, 27 Apr 2026 13:00:00 GMT",
        ];
        let latest = latest_update(headers.iter().copied()).expect("three headers parse");
        assert_eq!(latest, Utc.with_ymd_and_hms(2026, 4, 27, 16, 30, 0).unwrap());
        assert_eq!(latest_update(["", "nope"].iter().copied()), None);
    }

    // --- Description ---------------------------------------------------------

    #[test]
    fn test_description_with_hours() {
        let latest = Utc.with_ymd_and_hms(2026, 4, 27, 16, 35, 0).unwrap();
        assert_eq!(describe_freshness_at(latest, fixed_now()), "16:35 UTC (3h 25m ago)");
    }

    #[test]
    fn test_description_under_an_hour_omits_hours() {
        let latest = Utc.with_ymd_and_hms(2026, 4, 27, 19, 48, 0).unwrap();
        assert_eq!(describe_freshness_at(latest, fixed_now()), "19:48 UTC (12m ago)");
    }

    #[test]
    fn test_future_timestamp_reads_as_zero_age() {
        let latest = Utc.with_ymd_and_hms(2026, 4, 27, 20, 2, 0).unwrap();
        assert_eq!(age_minutes(latest, fixed_now()), 0);
        assert!(!is_stale_at(latest, 0, fixed_now()));
    }

    // --- Staleness -----------------------------------------------------------

    #[test]
    fn test_exactly_at_threshold_is_not_stale() {
        let latest = Utc.with_ymd_and_hms(2026, 4, 27, 14, 0, 0).unwrap(); // 360 min
        assert!(
            !is_stale_at(latest, 360, fixed_now()),
            "staleness is strictly greater than, not >="
        );
    }

    #[test]
    fn test_one_minute_past_threshold_is_stale() {
        let latest = Utc.with_ymd_and_hms(2026, 4, 27, 13, 59, 0).unwrap();
        assert!(is_stale_at(latest, 360, fixed_now()));
    }

    #[test]
    fn test_same_outlook_stale_under_tight_limit_only() {
        let latest = Utc.with_ymd_and_hms(2026, 4, 27, 18, 0, 0).unwrap(); // 2h old
        assert!(is_stale_at(latest, 60, fixed_now()));
        assert!(!is_stale_at(latest, 360, fixed_now()));
    }
}
