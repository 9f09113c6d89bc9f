// src/render/template.rs
//! Minimal jQuery-tmpl style templates.
//!
//! - `${field}` inserts the HTML-escaped value of a payload field.
//! - `{{html field}}` inserts it raw (for fields that already carry markup).
//!
//! Payload fields win over the built-ins `date`, `relative_date`,
//! `source_id` and `kind`. Missing fields render as an empty string.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::Renderer;
use crate::item::NormalizedItem;

fn placeholder_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{\s*(\w+)\s*\}|\{\{\s*html\s+(\w+)\s*\}\}").expect("placeholder regex")
    })
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    templates: HashMap<String, String>,
    fixed_now: Option<DateTime<Utc>>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(templates: &BTreeMap<String, String>) -> Self {
        Self {
            templates: templates
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            fixed_now: None,
        }
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    /// Pin the clock used for `relative_date`, overriding the run clock.
    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn lookup(&self, field: &str, item: &NormalizedItem, now: DateTime<Utc>) -> String {
        if let Some(v) = item.payload.get(field) {
            return value_text(v);
        }
        match field {
            "date" => item.timestamp.to_rfc3339(),
            "relative_date" => relative_date(item.timestamp, now),
            "source_id" => item.source_id.clone(),
            "kind" => item.kind.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, template: &str, item: &NormalizedItem, now: DateTime<Utc>) -> Result<String> {
        let source = self
            .templates
            .get(template)
            .ok_or_else(|| anyhow!("template `{template}` not registered"))?;
        let now = self.fixed_now.unwrap_or(now);

        let out = placeholder_re().replace_all(source, |caps: &Captures<'_>| {
            if let Some(escaped) = caps.get(1) {
                html_escape::encode_safe(&self.lookup(escaped.as_str(), item, now)).into_owned()
            } else if let Some(raw) = caps.get(2) {
                self.lookup(raw.as_str(), item, now)
            } else {
                String::new()
            }
        });
        Ok(out.into_owned())
    }

    fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

/// Human-readable age of `ts` relative to `now`.
pub fn relative_date(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    match secs {
        s if s < 60 => "less than a minute ago".to_string(),
        s if s < 120 => "about a minute ago".to_string(),
        s if s < 3_600 => format!("about {} minutes ago", s / 60),
        s if s < 7_200 => "about an hour ago".to_string(),
        s if s < 86_400 => format!("about {} hours ago", s / 3_600),
        s if s < 172_800 => "1 day ago".to_string(),
        s => format!("{} days ago", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2011, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_date_buckets() {
        let n = now();
        assert_eq!(relative_date(n, n), "less than a minute ago");
        assert_eq!(relative_date(n - Duration::seconds(90), n), "about a minute ago");
        assert_eq!(relative_date(n - Duration::minutes(5), n), "about 5 minutes ago");
        assert_eq!(relative_date(n - Duration::minutes(61), n), "about an hour ago");
        assert_eq!(relative_date(n - Duration::hours(5), n), "about 5 hours ago");
        assert_eq!(relative_date(n - Duration::hours(30), n), "1 day ago");
        assert_eq!(relative_date(n - Duration::days(3), n), "3 days ago");
        // clock skew: future items read as fresh
        assert_eq!(relative_date(n + Duration::minutes(3), n), "less than a minute ago");
    }

    #[test]
    fn escapes_dollar_fields_but_not_html_fields() {
        let r = TemplateRenderer::new()
            .with_template("t", "<p>${title}</p><div>{{html msg}}</div>")
            .with_fixed_now(now());
        let item = NormalizedItem::new(
            "s",
            now(),
            json!({ "title": "a < b", "msg": "<a href=\"x\">x</a>" }),
        );
        let html = r.render("t", &item, Utc::now()).unwrap();
        assert_eq!(html, "<p>a &lt; b</p><div><a href=\"x\">x</a></div>");
    }

    #[test]
    fn builtins_and_missing_fields() {
        let r = TemplateRenderer::new()
            .with_template("t", "${source_id}|${kind}|${relative_date}|${nope}|${tags}")
            .with_fixed_now(now());
        let item = NormalizedItem::new(
            "tumblr-1",
            now() - Duration::hours(2),
            json!({ "tags": ["rust", "feeds"] }),
        )
        .with_kind("photo");
        let html = r.render("t", &item, Utc::now()).unwrap();
        assert_eq!(html, "tumblr-1|photo|about 2 hours ago||rust feeds");
    }

    #[test]
    fn run_clock_drives_relative_date_unless_pinned() {
        let r = TemplateRenderer::new().with_template("t", "${relative_date}");
        let item = NormalizedItem::new("s", now() - Duration::minutes(5), json!({}));
        assert_eq!(r.render("t", &item, now()).unwrap(), "about 5 minutes ago");
        assert_eq!(
            r.render("t", &item, now() + Duration::hours(3)).unwrap(),
            "about 3 hours ago"
        );
    }

    #[test]
    fn unknown_template_is_an_error() {
        let r = TemplateRenderer::new();
        assert!(!r.has_template("missing"));
        let item = NormalizedItem::new("s", now(), json!({}));
        assert!(r.render("missing", &item, now()).is_err());
    }
}
