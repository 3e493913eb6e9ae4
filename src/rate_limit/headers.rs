//! Rate limit response header parsing.
//!
//! Recognizes `Retry-After`, the de facto `X-RateLimit-*` family and the
//! IETF draft `RateLimit-*` family. Lookups are case-insensitive.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::HeaderMap;

pub const RETRY_AFTER: &str = "retry-after";

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

pub const RATELIMIT_LIMIT: &str = "ratelimit-limit";
pub const RATELIMIT_RESET: &str = "ratelimit-reset";

/// RFC 850 and asctime layouts; RFC 1123 goes through `parse_from_rfc2822`.
const RFC850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Integer value of a header, `None` when absent or not a decimal integer.
pub fn header_int(headers: &HeaderMap, name: &str) -> Option<i64> {
    header_str(headers, name)?.parse().ok()
}

/// Unix timestamp (whole seconds) in a header, as a wall-clock instant.
pub fn header_unix_timestamp(headers: &HeaderMap, name: &str) -> Option<SystemTime> {
    header_int(headers, name).and_then(unix_timestamp)
}

/// Interprets `Retry-After` as an integer number of seconds from `now`, or
/// failing that as an HTTP date.
pub fn retry_after(headers: &HeaderMap, now: SystemTime) -> Option<SystemTime> {
    let value = header_str(headers, RETRY_AFTER)?;

    if let Ok(seconds) = value.parse::<i64>() {
        let offset = Duration::from_secs(seconds.unsigned_abs());
        return if seconds >= 0 {
            now.checked_add(offset)
        } else {
            now.checked_sub(offset)
        };
    }

    parse_http_date(value)
}

pub fn unix_timestamp(seconds: i64) -> Option<SystemTime> {
    let offset = Duration::from_secs(seconds.unsigned_abs());
    if seconds >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    }
}

/// Parses the three date formats HTTP/1.1 allows (RFC 1123, RFC 850, asctime).
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let value = value.trim();

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(SystemTime::from(date.with_timezone(&Utc)));
    }

    [RFC850_FORMAT, ASCTIME_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| SystemTime::from(naive.and_utc()))
}
