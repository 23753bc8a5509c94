//! Call time conversion for display.

use crate::constants::{DISPLAY_TIME_FORMAT, UNKNOWN};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Convert a raw UTC ISO-8601 timestamp to `YYYY-MM-DD HH:MM:SS TZ` in `timezone`.
///
/// Accepts RFC 3339 (with offset or `Z`) and offset-less timestamps, which are read as UTC.
/// Returns `"Unknown"` for blank input, an unparsable timestamp or an unknown zone name.
pub fn to_display_time(raw: &str, timezone: &str) -> String {
    let Ok(zone) = timezone.trim().parse::<Tz>() else {
        tracing::debug!(timezone, "unknown display timezone");
        return UNKNOWN.to_owned();
    };
    to_display_time_in(raw, zone)
}

/// Same as [`to_display_time`] with an already-resolved zone.
pub fn to_display_time_in(raw: &str, zone: Tz) -> String {
    match parse_utc(raw.trim()) {
        Some(instant) => instant
            .with_timezone(&zone)
            .format(DISPLAY_TIME_FORMAT)
            .to_string(),
        None => {
            tracing::debug!(raw, "unparsable call timestamp");
            UNKNOWN.to_owned()
        }
    }
}

fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
