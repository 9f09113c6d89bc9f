// src/ingest/providers/tumblr.rs
//! Tumblr v1 read API. Photo and video posts become items of kind `photo`
//! and `video`; every other post type (quote, text, link, ...) is skipped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{http_get, Mode};
use crate::ingest::types::{FetchRequest, SourceAdapter};
use crate::item::{from_epoch, normalize_keys, parse_timestamp, NormalizedItem};

const JSONP_PREFIX: &str = "var tumblr_api_read =";

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    posts: Vec<Map<String, Value>>,
}

pub struct TumblrProvider {
    mode: Mode,
}

impl TumblrProvider {
    /// Reads from `http://{user}.tumblr.com`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                client,
                base_url: String::new(),
            },
        }
    }

    /// Reads from a fixed host regardless of user.
    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            mode: Mode::Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    fn parse_items(body: &str, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        let t0 = std::time::Instant::now();
        let resp: ReadResponse =
            serde_json::from_str(strip_jsonp(body)).context("parsing tumblr read json")?;

        let mut out = Vec::with_capacity(resp.posts.len());
        for post in resp.posts {
            let kind = post.get("type").and_then(Value::as_str).unwrap_or_default();
            let fields = match kind {
                "photo" => json!({
                    "src": str_field(&post, "photo-url-250"),
                    "caption": str_field(&post, "photo-caption"),
                    "url": str_field(&post, "photo-link-url"),
                }),
                "video" => json!({
                    "video_player": str_field(&post, "video-player-250"),
                    "caption": str_field(&post, "video-caption"),
                }),
                other => {
                    tracing::trace!(source_id = %req.source_id, kind = other, "skipping tumblr post");
                    continue;
                }
            };

            let Some(ts) = post_timestamp(&post) else {
                tracing::debug!(source_id = %req.source_id, "tumblr post without usable date");
                continue;
            };

            // Raw post fields first (keys normalized), friendly names on top.
            let mut payload = match normalize_keys(Value::Object(post.clone())) {
                Value::Object(m) => m,
                _ => Map::new(),
            };
            if let Value::Object(extra) = fields {
                payload.extend(extra);
            }
            payload.insert(
                "date".into(),
                post.get("date").cloned().unwrap_or(Value::Null),
            );
            payload.insert("user".into(), Value::String(req.user.clone()));

            out.push(
                NormalizedItem::new(req.source_id.clone(), ts, Value::Object(payload))
                    .with_kind(kind),
            );
        }

        histogram!("funnel_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("funnel_provider_items_total", "provider" => "tumblr").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for TumblrProvider {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_items(body, req),
            Mode::Http { client, base_url } => {
                let body = http_get(client, &read_url(base_url, req), "tumblr").await?;
                Self::parse_items(&body, req)
            }
        }
    }

    fn name(&self) -> &'static str {
        "tumblr"
    }
}

fn read_url(base_url: &str, req: &FetchRequest) -> String {
    if base_url.is_empty() {
        format!("http://{}.tumblr.com/api/read/json?num={}", req.user, req.limit)
    } else {
        format!("{base_url}/api/read/json?num={}", req.limit)
    }
}

/// The read API answers `var tumblr_api_read = {...};` unless asked for a callback.
fn strip_jsonp(body: &str) -> &str {
    let s = body.trim();
    match s.strip_prefix(JSONP_PREFIX) {
        Some(rest) => rest.trim().trim_end_matches(';').trim_end(),
        None => s,
    }
}

fn str_field(post: &Map<String, Value>, key: &str) -> Value {
    post.get(key).cloned().unwrap_or(Value::Null)
}

fn post_timestamp(post: &Map<String, Value>) -> Option<chrono::DateTime<chrono::Utc>> {
    let epoch = match post.get("unix-timestamp") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    epoch
        .and_then(from_epoch)
        .or_else(|| post.get("date").and_then(Value::as_str).and_then(parse_timestamp))
}
