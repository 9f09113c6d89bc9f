// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use activity_funnel::render::TemplateRenderer;
use activity_funnel::{FetchRequest, NormalizedItem, RenderSink, RenderedFragment, SourceAdapter};

pub const TWITTER_JSON: &str = include_str!("../fixtures/twitter_timeline.json");
pub const DELICIOUS_JSON: &str = include_str!("../fixtures/delicious_feed.json");
pub const TUMBLR_JS: &str = include_str!("../fixtures/tumblr_read.js");

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn item(source_id: &str, secs: i64, label: &str) -> NormalizedItem {
    NormalizedItem::new(source_id, ts(secs), json!({ "label": label }))
}

/// Renders each item as its `label` payload field, template name `l`.
pub fn label_renderer() -> Arc<TemplateRenderer> {
    Arc::new(TemplateRenderer::new().with_template("l", "${label}"))
}

pub fn labels(frags: &[RenderedFragment]) -> Vec<String> {
    frags.iter().map(|f| f.html.clone()).collect()
}

/// How a gated fetch settles once released.
pub enum Gate {
    Items(Vec<NormalizedItem>),
    Fail(String),
    Panic,
}

/// Adapter whose fetches block until the test releases them, one gate per source id.
#[derive(Default)]
pub struct GateAdapter {
    gates: Mutex<HashMap<String, oneshot::Receiver<Gate>>>,
}

impl GateAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gate(&self, source_id: &str) -> oneshot::Sender<Gate> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(source_id.to_string(), rx);
        tx
    }
}

#[async_trait]
impl SourceAdapter for GateAdapter {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        let rx = self
            .gates
            .lock()
            .remove(&req.source_id)
            .ok_or_else(|| anyhow!("no gate for {}", req.source_id))?;
        match rx.await {
            Ok(Gate::Items(items)) => Ok(items),
            Ok(Gate::Fail(msg)) => Err(anyhow!(msg)),
            Ok(Gate::Panic) => panic!("gate adapter panicked on purpose"),
            Err(_) => Err(anyhow!("gate dropped")),
        }
    }

    fn name(&self) -> &'static str {
        "gate"
    }
}

/// Adapter that answers immediately with a fixed list.
pub struct StaticAdapter(pub Vec<NormalizedItem>);

#[async_trait]
impl SourceAdapter for StaticAdapter {
    async fn fetch(&self, _req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Sink forwarding every replacement to the test.
pub struct ChannelSink(mpsc::UnboundedSender<Vec<RenderedFragment>>);

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<RenderedFragment>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

impl RenderSink for ChannelSink {
    fn replace(&self, fragments: &[RenderedFragment]) {
        let _ = self.0.send(fragments.to_vec());
    }
}
