// src/ingest/providers/twitter.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::json;

use super::{http_get, Mode};
use crate::ingest::types::{FetchRequest, SourceAdapter};
use crate::item::{parse_timestamp, NormalizedItem};

const DEFAULT_BASE_URL: &str = "http://twitter.com";

#[derive(Debug, Deserialize)]
struct Tweet {
    created_at: String,
    text: String,
    #[serde(default)]
    id_str: Option<String>,
}

/// User timeline provider. One item per tweet, no kinds.
pub struct TwitterProvider {
    mode: Mode,
}

impl TwitterProvider {
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

    fn timeline_url(base_url: &str, req: &FetchRequest) -> String {
        format!(
            "{base_url}/status/user_timeline/{}.json?count={}",
            req.user, req.limit
        )
    }

    fn parse_items(body: &str, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        let t0 = std::time::Instant::now();
        let tweets: Vec<Tweet> = serde_json::from_str(body).context("parsing twitter timeline json")?;

        let mut out = Vec::with_capacity(tweets.len());
        for tw in tweets {
            let Some(ts) = parse_timestamp(&tw.created_at) else {
                tracing::debug!(source_id = %req.source_id, date = %tw.created_at, "unparseable tweet date");
                continue;
            };
            let payload = json!({
                "date": tw.created_at,
                "msg": tweetify(&tw.text),
                "user": req.user,
                "id": tw.id_str,
            });
            out.push(NormalizedItem::new(req.source_id.clone(), ts, payload));
        }

        histogram!("funnel_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("funnel_provider_items_total", "provider" => "twitter").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for TwitterProvider {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_items(body, req),
            Mode::Http { client, base_url } => {
                let body = http_get(client, &Self::timeline_url(base_url, req), "twitter").await?;
                Self::parse_items(&body, req)
            }
        }
    }

    fn name(&self) -> &'static str {
        "twitter"
    }
}

fn tweet_token_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        // Mentions and tags only start after a non-word character, so e-mail
        // addresses and `a#b` stay plain text.
        Regex::new(r"(?P<url>https?://[^\s<]+)|(?P<pre>^|\W)(?:@(?P<user>\w+)|#(?P<tag>\w+))")
            .expect("tweet regex")
    })
}

/// HTML-escape tweet text and turn URLs, @mentions and #hashtags into links.
pub fn tweetify(text: &str) -> String {
    let escaped = html_escape::encode_text(text);
    tweet_token_re()
        .replace_all(&escaped, |caps: &Captures<'_>| {
            let pre = caps.name("pre").map_or("", |m| m.as_str());
            if let Some(url) = caps.name("url") {
                let u = url.as_str();
                format!(r#"<a href="{u}">{u}</a>"#)
            } else if let Some(user) = caps.name("user") {
                let u = user.as_str();
                format!(r#"{pre}<a href="http://twitter.com/{u}">@{u}</a>"#)
            } else if let Some(tag) = caps.name("tag") {
                let t = tag.as_str();
                format!(r#"{pre}<a href="http://search.twitter.com/search?q=%23{t}">#{t}</a>"#)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}
