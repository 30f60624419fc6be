use crate::error::{BmError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Storage format of every timestamp written by the internal formats
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Seconds between 1601-01-01 (WebKit epoch) and 1970-01-01
const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

fn url_regex() -> &'static Regex {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    URL_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:\S+$").expect("static URL pattern is valid")
    })
}

/// Check that a URL is non-empty, carries a scheme and has no whitespace
pub fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(BmError::InvalidInput("URL must not be empty".to_string()));
    }
    if !url_regex().is_match(url) {
        return Err(BmError::InvalidInput(format!("Malformed URL '{}'", url)));
    }
    Ok(())
}

/// Current time truncated to whole seconds
pub fn now() -> NaiveDateTime {
    let secs = Utc::now().timestamp();
    DateTime::from_timestamp(secs, 0)
        .unwrap_or_default()
        .naive_utc()
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Convert a Chrome timestamp (microseconds since 1601-01-01 UTC)
///
/// Zero means "unset" in Chrome files and maps to `None`.
pub fn from_webkit_micros(micros: i64) -> Option<NaiveDateTime> {
    if micros == 0 {
        return None;
    }
    let secs = micros.div_euclid(1_000_000) - WEBKIT_EPOCH_OFFSET_SECS;
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}
