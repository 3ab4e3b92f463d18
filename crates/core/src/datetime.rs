//! Date-time text formats accepted and produced by the query surface
//!
//! Conversions speak the compact ISO 8601 basic form (`20240310T023000`,
//! with a trailing `Z` for UTC). The extended form (`2024-03-10T02:30:00`)
//! is accepted on input as well. Dataset timestamps use RFC 3339.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};

const BASIC: &str = "%Y%m%dT%H%M%S";
const EXTENDED: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a floating (zone-less) date-time. Rejects UTC-suffixed input.
#[must_use]
pub fn parse_local(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.ends_with('Z') || value.ends_with('z') {
        return None;
    }
    NaiveDateTime::parse_from_str(value, BASIC)
        .or_else(|_| NaiveDateTime::parse_from_str(value, EXTENDED))
        .ok()
}

/// Parse a UTC date-time carrying a trailing `Z`.
#[must_use]
pub fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    let body = value.trim().strip_suffix('Z')?;
    NaiveDateTime::parse_from_str(body, BASIC)
        .or_else(|_| NaiveDateTime::parse_from_str(body, EXTENDED))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Whether the value is a well formed UTC date-time
#[must_use]
pub fn is_utc(value: &str) -> bool {
    parse_utc(value).is_some()
}

/// `20240310T073000Z`
#[must_use]
pub fn format_utc(value: DateTime<Utc>) -> String {
    value.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `20240310T023000`
#[must_use]
pub fn format_local(value: NaiveDateTime) -> String {
    value.format(BASIC).to_string()
}

/// Parse a dataset timestamp (manifest `buildTime`, stored `meta/dtstamp`).
///
/// A timestamp without a UTC designator or offset is taken to be UTC.
#[must_use]
pub fn parse_dtstamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = parse_utc(value) {
        return Some(dt);
    }
    let body = value.split('.').next().unwrap_or(value);
    NaiveDateTime::parse_from_str(body, EXTENDED)
        .or_else(|_| NaiveDateTime::parse_from_str(body, BASIC))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Render a dataset timestamp as RFC 3339 with second precision
#[must_use]
pub fn format_dtstamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an expansion window bound: a date (midnight UTC), a UTC date-time
/// or a floating date-time (read as UTC).
#[must_use]
pub fn parse_window_bound(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(dt) = parse_utc(value) {
        return Some(dt);
    }
    if let Some(naive) = parse_local(value) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Midnight UTC of the day containing `now`
#[must_use]
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}
