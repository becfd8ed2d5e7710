//! Tolerant accessors over loosely typed carrier payloads.
//!
//! Carriers omit fields, send `null`, send a bare object where a list is
//! expected, or send numbers where strings are expected. Normalizers go through
//! these helpers so every such variation degrades to an empty value instead of
//! a failure.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use trackdb_core::CanonicalEvent;

/// Treats a missing value or `null` as an empty list and a single object as a
/// one-element list.
#[must_use]
pub fn one_or_many(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
        Some(other) => vec![other],
    }
}

/// Follows `path` through nested objects.
///
/// Arrays met along the way resolve to their first element, so a path keeps
/// working whether the carrier sent one child or many.
#[must_use]
pub fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = first(value)?;
    for key in path {
        current = first(current.get(*key)?)?;
    }
    Some(current)
}

fn first(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => items.iter().find(|v| !v.is_null()),
        other => Some(other),
    }
}

/// Scalar at `path` rendered as trimmed text; anything else becomes `""`.
#[must_use]
pub fn text(value: &Value, path: &[&str]) -> String {
    at(value, path).map(scalar_text).unwrap_or_default()
}

/// Renders a scalar as text. Objects and arrays render as `""`.
#[must_use]
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Parses the timestamp formats carriers are known to emit.
///
/// Values without an offset are read as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y%m%d%H%M%S",
        "%Y-%m-%dT%H:%M",
    ];
    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Joins a separate date and time into one timestamp.
///
/// A missing or unparsable time falls back to midnight of the date.
#[must_use]
pub fn parse_date_time(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let (date, time) = (date.trim(), time.trim());
    if time.is_empty() {
        return parse_timestamp(date);
    }
    let digits: String = time.chars().filter(char::is_ascii_digit).collect();
    let combined = match digits.len() {
        6 => format!("{}{digits}", date.replace('-', "")),
        4 => format!("{}{digits}00", date.replace('-', "")),
        _ => return parse_timestamp(&format!("{date}T{time}")).or_else(|| parse_timestamp(date)),
    };
    parse_timestamp(&combined).or_else(|| parse_timestamp(date))
}

/// Picks the most recent event.
///
/// Events with a timestamp beat events without one; among timestamped events
/// the largest wins, and the first reported wins a tie. When no event carries
/// a timestamp the first reported event is returned. An empty list yields the
/// default event.
#[must_use]
pub fn most_recent(events: Vec<(Option<DateTime<Utc>>, CanonicalEvent)>) -> CanonicalEvent {
    let mut best: Option<(DateTime<Utc>, CanonicalEvent)> = None;
    let mut first_untimed: Option<CanonicalEvent> = None;

    for (timestamp, event) in events {
        match timestamp {
            Some(ts) => {
                if best.as_ref().is_none_or(|(current, _)| ts > *current) {
                    best = Some((ts, event));
                }
            }
            None => {
                if first_untimed.is_none() {
                    first_untimed = Some(event);
                }
            }
        }
    }

    best.map(|(_, event)| event)
        .or(first_untimed)
        .unwrap_or_default()
}
