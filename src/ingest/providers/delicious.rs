// src/ingest/providers/delicious.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;
use serde_json::json;

use super::{http_get, Mode};
use crate::ingest::types::{FetchRequest, SourceAdapter};
use crate::item::{parse_timestamp, NormalizedItem};

const DEFAULT_BASE_URL: &str = "http://feeds.delicious.com";

/// Bookmark as returned by the v2 JSON feed.
#[derive(Debug, Deserialize)]
struct Bookmark {
    /// date
    dt: String,
    /// url
    u: String,
    /// title
    #[serde(default)]
    d: String,
    /// tags
    #[serde(default)]
    t: Vec<String>,
    /// notes
    #[serde(default)]
    n: String,
}

pub struct DeliciousProvider {
    mode: Mode,
}

impl DeliciousProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                client,
                base_url: DEFAULT_BASE_URL.to_string(),
            },
        }
    }

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

    fn feed_url(base_url: &str, req: &FetchRequest) -> String {
        match req.params.get("tag") {
            Some(tag) => format!(
                "{base_url}/v2/json/{}/{}?plain&count={}",
                req.user, tag, req.limit
            ),
            None => format!("{base_url}/v2/json/{}?plain&count={}", req.user, req.limit),
        }
    }

    fn parse_items(body: &str, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        let t0 = std::time::Instant::now();
        let marks: Vec<Bookmark> =
            serde_json::from_str(body).context("parsing delicious feed json")?;

        let mut out = Vec::with_capacity(marks.len());
        for b in marks {
            let Some(ts) = parse_timestamp(&b.dt) else {
                tracing::debug!(source_id = %req.source_id, date = %b.dt, "unparseable bookmark date");
                continue;
            };
            let payload = json!({
                "date": b.dt,
                "url": b.u,
                "title": b.d,
                "tags": b.t,
                "msg": b.n,
                "user": req.user,
            });
            out.push(NormalizedItem::new(req.source_id.clone(), ts, payload));
        }

        histogram!("funnel_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("funnel_provider_items_total", "provider" => "delicious")
            .increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for DeliciousProvider {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_items(body, req),
            Mode::Http { client, base_url } => {
                let body = http_get(client, &Self::feed_url(base_url, req), "delicious").await?;
                Self::parse_items(&body, req)
            }
        }
    }

    fn name(&self) -> &'static str {
        "delicious"
    }
}
