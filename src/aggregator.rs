//! # Aggregator
//! Run-scoped owner of the accumulated items and the settlement counter.
//!
//! Every settlement appends the source's items (or nothing, on failure),
//! recomputes the full time-ordered capped view, hands it to the sink as a
//! complete replacement and then records the settlement. The accumulated
//! collection is append-only; the capped view is derived on each pass.
//!
//! `ingest` takes `&mut self`, so callers serialize access. `Funnel` does
//! this by giving the aggregator to a single collector task.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::completion::{CompletionTracker, Settlement};
use crate::config::{OnSettled, TemplateRef};
use crate::item::NormalizedItem;
use crate::render::{render_view, RenderSink, RenderedFragment, Renderer};

/// What one source's fetch settled with.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Items(Vec<NormalizedItem>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceResult {
    pub source_id: String,
    pub outcome: SourceOutcome,
}

impl SourceResult {
    pub fn items(source_id: impl Into<String>, items: Vec<NormalizedItem>) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: SourceOutcome::Items(items),
        }
    }

    pub fn failed(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: SourceOutcome::Failed(reason.into()),
        }
    }
}

/// Summary of a run, as seen by its aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub expected: usize,
    pub settled: usize,
    pub failed_sources: Vec<String>,
    pub accumulated: usize,
    pub rendered: usize,
    pub completed: bool,
}

pub struct Aggregator {
    max_items: usize,
    templates: HashMap<String, TemplateRef>,
    items: Vec<NormalizedItem>,
    settled_sources: HashSet<String>,
    failed_sources: Vec<String>,
    tracker: CompletionTracker,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn RenderSink>,
    last_rendered: usize,
    /// Clock for every render pass of this run.
    render_clock: DateTime<Utc>,
}

impl Aggregator {
    /// `sources` pairs each configured source id with its template selection;
    /// its length is the number of settlements the run waits for.
    pub fn new(
        sources: Vec<(String, TemplateRef)>,
        max_items: usize,
        on_settled: Option<OnSettled>,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let expected = sources.len();
        Self {
            max_items,
            templates: sources.into_iter().collect(),
            items: Vec::new(),
            settled_sources: HashSet::new(),
            failed_sources: Vec::new(),
            tracker: CompletionTracker::new(expected, on_settled),
            renderer,
            sink,
            last_rendered: 0,
            render_clock: Utc::now(),
        }
    }

    /// Pin the clock relative dates are rendered against.
    pub fn with_render_clock(mut self, now: DateTime<Utc>) -> Self {
        self.render_clock = now;
        self
    }

    /// Accept one source's settlement: append, merge-and-render, then count it.
    ///
    /// Items whose kind has no template for their source are dropped before
    /// the append. Unknown source ids and second settlements of the same
    /// source are ignored without touching state.
    pub fn ingest(&mut self, result: SourceResult) -> Settlement {
        let SourceResult { source_id, outcome } = result;

        if !self.templates.contains_key(&source_id) {
            tracing::warn!(source_id = %source_id, "settlement from unknown source; ignoring");
            return Settlement::Ignored;
        }
        if !self.settled_sources.insert(source_id.clone()) {
            tracing::warn!(source_id = %source_id, "source settled twice; ignoring");
            return Settlement::Ignored;
        }

        match outcome {
            SourceOutcome::Items(mut items) => {
                let received = items.len();
                if let Some(template) = self.templates.get(&source_id) {
                    items.retain(|it| template.for_kind(it.kind.as_deref()).is_some());
                }
                if items.len() < received {
                    tracing::debug!(
                        source_id = %source_id,
                        dropped = received - items.len(),
                        "items without a template for their kind left out"
                    );
                }
                counter!("funnel_items_ingested_total").increment(items.len() as u64);
                tracing::debug!(source_id = %source_id, items = items.len(), "source settled");
                self.items.extend(items);
            }
            SourceOutcome::Failed(reason) => {
                counter!("funnel_source_failures_total").increment(1);
                tracing::warn!(source_id = %source_id, %reason, "source failed; contributes no items");
                self.failed_sources.push(source_id);
            }
        }

        self.merge_and_render();

        counter!("funnel_settlements_total").increment(1);
        let settlement = self.tracker.record_settlement();
        match settlement {
            Settlement::Pending { settled, expected } => {
                tracing::debug!(settled, expected, "waiting for remaining sources");
            }
            Settlement::Completed => {
                counter!("funnel_runs_completed_total").increment(1);
                tracing::info!(
                    expected = self.tracker.expected(),
                    accumulated = self.items.len(),
                    rendered = self.last_rendered,
                    failed = self.failed_sources.len(),
                    "all sources settled"
                );
            }
            Settlement::Ignored => {}
        }
        settlement
    }

    /// Accumulated items sorted newest first, ties in arrival order, capped.
    pub fn capped_view(&self) -> Vec<&NormalizedItem> {
        let mut view: Vec<&NormalizedItem> = self.items.iter().collect();
        // slice::sort_by is stable: equal timestamps keep arrival order.
        view.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        view.truncate(self.max_items);
        view
    }

    /// Recompute the capped view, render it and replace the sink's content.
    pub fn merge_and_render(&mut self) -> Vec<RenderedFragment> {
        let fragments = {
            let view = self.capped_view();
            render_view(
                self.renderer.as_ref(),
                &self.templates,
                &view,
                self.render_clock,
            )
        };
        self.sink.replace(&fragments);
        self.last_rendered = fragments.len();
        gauge!("funnel_rendered_items").set(fragments.len() as f64);
        fragments
    }

    pub fn items(&self) -> &[NormalizedItem] {
        &self.items
    }

    pub fn is_complete(&self) -> bool {
        self.tracker.is_complete()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            expected: self.tracker.expected(),
            settled: self.tracker.settled(),
            failed_sources: self.failed_sources.clone(),
            accumulated: self.items.len(),
            rendered: self.last_rendered,
            completed: self.tracker.is_complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MemorySink, TemplateRenderer};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn item(src: &str, secs: i64, label: &str) -> NormalizedItem {
        NormalizedItem::new(src, t(secs), json!({ "label": label }))
    }

    fn setup(
        ids: &[&str],
        max_items: usize,
    ) -> (Aggregator, Arc<MemorySink>, Arc<AtomicUsize>) {
        let renderer = Arc::new(TemplateRenderer::new().with_template("l", "${label}"));
        let sink = Arc::new(MemorySink::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let cb: OnSettled = Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let sources = ids
            .iter()
            .map(|id| (id.to_string(), TemplateRef::from("l")))
            .collect();
        let agg = Aggregator::new(sources, max_items, Some(cb), renderer, sink.clone());
        (agg, sink, fired)
    }

    fn labels(frags: &[RenderedFragment]) -> Vec<String> {
        frags.iter().map(|f| f.html.clone()).collect()
    }

    #[test]
    fn concrete_two_source_scenario() {
        let (mut agg, sink, fired) = setup(&["A", "B"], 2);

        agg.ingest(SourceResult::items(
            "A",
            vec![item("A", 10, "a10"), item("A", 30, "a30")],
        ));
        assert_eq!(labels(&sink.last().unwrap()), vec!["a30", "a10"]);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let s = agg.ingest(SourceResult::items("B", vec![item("B", 20, "b20")]));
        assert_eq!(s, Settlement::Completed);
        assert_eq!(labels(&sink.last().unwrap()), vec!["a30", "b20"]);
        assert_eq!(agg.items().len(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(sink.calls().len(), 2);
    }

    #[test]
    fn ties_keep_arrival_order() {
        let (mut agg, sink, _) = setup(&["A", "B"], 10);
        agg.ingest(SourceResult::items("A", vec![item("A", 50, "a")]));
        agg.ingest(SourceResult::items("B", vec![item("B", 50, "b")]));
        assert_eq!(labels(&sink.last().unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn failure_counts_as_settlement() {
        let (mut agg, sink, fired) = setup(&["A", "B"], 10);
        agg.ingest(SourceResult::failed("A", "boom"));
        assert_eq!(sink.calls().len(), 1);
        assert!(sink.last().unwrap().is_empty());
        agg.ingest(SourceResult::items("B", vec![item("B", 1, "b")]));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let report = agg.report();
        assert_eq!(report.failed_sources, vec!["A".to_string()]);
        assert!(report.completed);
        assert_eq!(report.rendered, 1);
    }

    #[test]
    fn duplicate_and_unknown_settlements_are_ignored() {
        let (mut agg, sink, fired) = setup(&["A", "B"], 10);
        agg.ingest(SourceResult::items("A", vec![item("A", 1, "a")]));
        assert_eq!(
            agg.ingest(SourceResult::items("A", vec![item("A", 2, "again")])),
            Settlement::Ignored
        );
        assert_eq!(
            agg.ingest(SourceResult::items("Z", vec![item("Z", 3, "z")])),
            Settlement::Ignored
        );
        assert_eq!(agg.items().len(), 1);
        assert_eq!(sink.calls().len(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn merge_and_render_is_idempotent() {
        let (mut agg, sink, _) = setup(&["A"], 2);
        agg.ingest(SourceResult::items(
            "A",
            vec![item("A", 3, "x"), item("A", 9, "y"), item("A", 5, "z")],
        ));
        let first = agg.merge_and_render();
        let second = agg.merge_and_render();
        assert_eq!(first, second);
        let calls = sink.calls();
        assert_eq!(calls[calls.len() - 1], calls[calls.len() - 2]);
        // underlying collection untouched by the capped view
        assert_eq!(agg.items().len(), 3);
        assert_eq!(agg.items()[0].payload["label"], "x");
    }

    #[test]
    fn unmapped_kinds_do_not_take_capped_slots() {
        let renderer = Arc::new(TemplateRenderer::new().with_template("p", "p${label}"));
        let sink = Arc::new(MemorySink::new());
        let mut agg = Aggregator::new(
            vec![("blog".to_string(), TemplateRef::from([("photo", "p")]))],
            2,
            None,
            renderer,
            sink.clone(),
        );
        agg.ingest(SourceResult::items(
            "blog",
            vec![
                item("blog", 30, "30").with_kind("video"),
                item("blog", 20, "20").with_kind("photo"),
                item("blog", 10, "10").with_kind("photo"),
            ],
        ));
        assert_eq!(labels(&sink.last().unwrap()), vec!["p20", "p10"]);
        assert_eq!(agg.items().len(), 2);
        assert_eq!(agg.report().rendered, 2);
    }

    #[test]
    fn relative_dates_are_stable_across_render_passes() {
        let renderer = Arc::new(TemplateRenderer::new().with_template("r", "${relative_date}"));
        let sink = Arc::new(MemorySink::new());
        let mut agg = Aggregator::new(
            vec![("A".to_string(), TemplateRef::from("r"))],
            5,
            None,
            renderer,
            sink.clone(),
        );
        // Just inside the first bucket; the live clock crosses it while sleeping.
        let ts = Utc::now() - chrono::Duration::seconds(59);
        agg.ingest(SourceResult::items(
            "A",
            vec![NormalizedItem::new("A", ts, json!({}))],
        ));
        let first = agg.merge_and_render();
        std::thread::sleep(std::time::Duration::from_millis(1_500));
        let second = agg.merge_and_render();

        assert_eq!(first[0].html, "less than a minute ago");
        assert_eq!(first, second);
    }

    #[test]
    fn pinned_render_clock_is_used() {
        let renderer = Arc::new(TemplateRenderer::new().with_template("r", "${relative_date}"));
        let sink = Arc::new(MemorySink::new());
        let mut agg = Aggregator::new(
            vec![("A".to_string(), TemplateRef::from("r"))],
            5,
            None,
            renderer,
            sink.clone(),
        )
        .with_render_clock(t(7_200));
        agg.ingest(SourceResult::items("A", vec![item("A", 0, "x")]));
        assert_eq!(labels(&sink.last().unwrap()), vec!["about 2 hours ago"]);
    }
}
