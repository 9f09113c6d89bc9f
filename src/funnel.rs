//! # Funnel
//! Starts runs: validates the configuration, resolves one adapter per source,
//! spawns one fetch task per source and a single collector task that owns the
//! run's `Aggregator`. Fetch tasks only send their `SourceResult` over a
//! channel, so every append/sort/render/settle step happens on the collector,
//! one settlement at a time.

use anyhow::Context;
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument;

use crate::aggregator::{Aggregator, RunReport, SourceResult};
use crate::config::AggregationConfig;
use crate::error::ConfigurationError;
use crate::ingest::{ensure_metrics_described, AdapterRegistry, FetchRequest, SourceAdapter};
use crate::render::{RenderSink, Renderer};

pub struct Funnel {
    registry: AdapterRegistry,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn RenderSink>,
    runs: AtomicU64,
}

impl Funnel {
    pub fn new(
        registry: AdapterRegistry,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            registry,
            renderer,
            sink,
            runs: AtomicU64::new(0),
        }
    }

    /// Start a run. Must be called inside a tokio runtime.
    ///
    /// Fails synchronously, before anything is spawned, when the configuration
    /// is invalid, names an unregistered provider or references a template the
    /// renderer does not know.
    pub fn start(&self, config: AggregationConfig) -> Result<RunHandle, ConfigurationError> {
        ensure_metrics_described();
        config.validate()?;

        let ids = config.source_ids();
        let limit = config.per_source_limit();

        let mut plan: Vec<(Arc<dyn SourceAdapter>, FetchRequest)> =
            Vec::with_capacity(config.sources.len());
        for (source_id, src) in ids.iter().zip(&config.sources) {
            let adapter = self.registry.resolve(&src.provider).ok_or_else(|| {
                ConfigurationError::UnknownProvider {
                    source_id: source_id.clone(),
                    provider: src.provider.clone(),
                }
            })?;
            if let Some(missing) = src
                .template
                .names()
                .into_iter()
                .find(|name| !self.renderer.has_template(name))
            {
                return Err(ConfigurationError::UnknownTemplate {
                    source_id: source_id.clone(),
                    template: missing.to_string(),
                });
            }
            plan.push((
                adapter,
                FetchRequest {
                    source_id: source_id.clone(),
                    user: src.user.clone(),
                    params: src.params.clone(),
                    limit,
                },
            ));
        }

        let AggregationConfig {
            sources,
            max_items,
            on_settled,
        } = config;
        let expected = sources.len();
        let templates = ids
            .into_iter()
            .zip(sources.into_iter().map(|s| s.template))
            .collect();
        let aggregator = Aggregator::new(
            templates,
            max_items,
            on_settled,
            self.renderer.clone(),
            self.sink.clone(),
        );

        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let span = tracing::info_span!("funnel_run", run);
        let (tx, rx) = mpsc::unbounded_channel();

        let fetches = plan
            .into_iter()
            .map(|(adapter, req)| {
                tokio::spawn(settle_source(adapter, req, tx.clone()).instrument(span.clone()))
            })
            .collect();
        drop(tx);

        let collector = tokio::spawn(collect(aggregator, rx).instrument(span.clone()));

        counter!("funnel_runs_started_total").increment(1);
        span.in_scope(|| tracing::info!(sources = expected, max_items, limit, "run started"));

        Ok(RunHandle {
            run,
            expected,
            collector,
            fetches,
        })
    }
}

/// Handle to a running aggregation.
#[derive(Debug)]
pub struct RunHandle {
    run: u64,
    expected: usize,
    collector: JoinHandle<RunReport>,
    fetches: Vec<JoinHandle<()>>,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn is_finished(&self) -> bool {
        self.collector.is_finished()
    }

    /// Wait until every source settled (or the run ended otherwise).
    pub async fn wait(self) -> anyhow::Result<RunReport> {
        self.collector.await.context("run collector task failed")
    }

    /// Abort the run and wait until none of its tasks can touch the sink again.
    pub async fn cancel(self) {
        for f in &self.fetches {
            f.abort();
        }
        self.collector.abort();
        let _ = self.collector.await;
        for f in self.fetches {
            let _ = f.await;
        }
        tracing::debug!(run = self.run, "run cancelled");
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Fetch one source and report its settlement exactly once.
/// Errors and panics inside the adapter both settle as failures.
async fn settle_source(
    adapter: Arc<dyn SourceAdapter>,
    req: FetchRequest,
    tx: mpsc::UnboundedSender<SourceResult>,
) {
    let source_id = req.source_id.clone();
    let provider = adapter.name();

    let inner = tokio::spawn(async move { adapter.fetch(&req).await });
    let _guard = AbortOnDrop(inner.abort_handle());

    let result = match inner.await {
        Ok(Ok(mut items)) => {
            for it in &mut items {
                if it.source_id != source_id {
                    it.source_id = source_id.clone();
                }
            }
            SourceResult::items(source_id, items)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = ?e, source_id = %source_id, provider, "source fetch failed");
            SourceResult::failed(source_id, format!("{e:#}"))
        }
        Err(join_err) => {
            tracing::warn!(error = %join_err, source_id = %source_id, provider, "source fetch aborted or panicked");
            SourceResult::failed(source_id, join_err.to_string())
        }
    };

    // A closed channel means the run was cancelled.
    let _ = tx.send(result);
}

async fn collect(
    mut aggregator: Aggregator,
    mut rx: mpsc::UnboundedReceiver<SourceResult>,
) -> RunReport {
    while let Some(result) = rx.recv().await {
        aggregator.ingest(result);
        if aggregator.is_complete() {
            break;
        }
    }
    let report = aggregator.report();
    if !report.completed {
        tracing::warn!(
            settled = report.settled,
            expected = report.expected,
            "run ended before every source settled"
        );
    }
    report
}
