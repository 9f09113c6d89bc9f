//! # Normalized items
//! The canonical shape every provider maps its entries into before they reach
//! the aggregator, plus the helpers adapters use to build it: timestamp
//! derivation from the many date representations feeds use, and payload key
//! normalization so template field names stay valid identifiers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

/// Twitter's `created_at` layout, e.g. `Wed Aug 27 13:08:45 +0000 2008`.
const TWITTER_LAYOUT: &str = "%a %b %d %H:%M:%S %z %Y";

/// One activity entry from one configured source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    /// Sort key. Most recent first in every rendered view.
    pub timestamp: DateTime<Utc>,
    /// Id of the configured source (not the provider type).
    pub source_id: String,
    /// Provider sub-type (e.g. `photo`, `video`); selects the template.
    pub kind: Option<String>,
    /// Provider-specific fields handed to the renderer untouched.
    pub payload: Value,
}

impl NormalizedItem {
    pub fn new(source_id: impl Into<String>, timestamp: DateTime<Utc>, payload: Value) -> Self {
        Self {
            timestamp,
            source_id: source_id.into(),
            kind: None,
            payload,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Unix seconds → UTC instant.
pub fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Parse the date strings found in feed payloads.
///
/// Tried in order: RFC 3339, RFC 2822, Twitter `created_at`, and a bare
/// `YYYY-MM-DD HH:MM:SS` (optionally suffixed with `GMT`/`UTC`), read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return from_epoch(dt.unix_timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_str(s, TWITTER_LAYOUT) {
        return Some(dt.with_timezone(&Utc));
    }

    let bare = s
        .strip_suffix(" GMT")
        .or_else(|| s.strip_suffix(" UTC"))
        .unwrap_or(s);
    NaiveDateTime::parse_from_str(bare, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

/// Rewrite object keys so every char outside `[A-Za-z0-9_]` becomes `_`.
/// Recurses into nested objects and arrays.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(normalize_key(&k), normalize_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let t = parse_timestamp("2011-03-01T13:00:00+01:00").unwrap();
        assert_eq!(t, utc(2011, 3, 1, 12, 0, 0));
    }

    #[test]
    fn parses_rfc2822_and_gmt() {
        let t = parse_timestamp("Sat, 05 Mar 2011 13:21:00 +0000").unwrap();
        assert_eq!(t, utc(2011, 3, 5, 13, 21, 0));
        let g = parse_timestamp("Sat, 05 Mar 2011 13:21:00 GMT").unwrap();
        assert_eq!(g, t);
    }

    #[test]
    fn parses_twitter_created_at() {
        let t = parse_timestamp("Wed Aug 27 13:08:45 +0000 2008").unwrap();
        assert_eq!(t, utc(2008, 8, 27, 13, 8, 45));
    }

    #[test]
    fn parses_bare_datetime_as_utc() {
        assert_eq!(
            parse_timestamp("2011-03-05 13:21:00 GMT").unwrap(),
            utc(2011, 3, 5, 13, 21, 0)
        );
        assert_eq!(
            parse_timestamp("2011-03-05 13:21:00").unwrap(),
            utc(2011, 3, 5, 13, 21, 0)
        );
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday-ish").is_none());
    }

    #[test]
    fn epoch_roundtrip() {
        assert_eq!(from_epoch(1_299_331_260).unwrap(), utc(2011, 3, 5, 13, 21, 0));
    }

    #[test]
    fn keys_are_normalized_recursively() {
        let v = json!({
            "photo-url-250": "a.jpg",
            "nested": { "video.player": 1 },
            "list": [{ "x y": true }]
        });
        let n = normalize_keys(v);
        assert_eq!(n["photo_url_250"], "a.jpg");
        assert_eq!(n["nested"]["video_player"], 1);
        assert_eq!(n["list"][0]["x_y"], true);
    }
}
