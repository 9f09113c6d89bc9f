// src/ingest/providers/mod.rs
pub mod delicious;
pub mod tumblr;
pub mod twitter;

pub use delicious::DeliciousProvider;
pub use tumblr::TumblrProvider;
pub use twitter::TwitterProvider;

use anyhow::{Context, Result};
use metrics::histogram;

/// Where a provider reads its response body from.
pub(crate) enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        base_url: String,
    },
}

/// GET `url` and return the body, failing on non-2xx.
pub(crate) async fn http_get(client: &reqwest::Client, url: &str, provider: &str) -> Result<String> {
    let t0 = std::time::Instant::now();
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("{provider} http get()"))?
        .error_for_status()
        .with_context(|| format!("{provider} http status"))?;
    let body = resp
        .text()
        .await
        .with_context(|| format!("{provider} http .text()"))?;
    histogram!("funnel_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(body)
}
