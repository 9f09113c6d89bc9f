// src/ingest/mod.rs
pub mod providers;
pub mod registry;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use registry::{AdapterRegistry, WithTimeout};
pub use types::{FetchRequest, SourceAdapter};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("funnel_runs_started_total", "Runs dispatched.");
        describe_counter!(
            "funnel_runs_completed_total",
            "Runs whose sources all settled."
        );
        describe_counter!(
            "funnel_settlements_total",
            "Source settlements, successful or not."
        );
        describe_counter!(
            "funnel_source_failures_total",
            "Source fetches that settled as failures."
        );
        describe_counter!(
            "funnel_items_ingested_total",
            "Items appended to run collections."
        );
        describe_counter!(
            "funnel_provider_items_total",
            "Items produced by provider parsers."
        );
        describe_histogram!("funnel_fetch_ms", "Source fetch time in milliseconds.");
        describe_histogram!("funnel_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!("funnel_rendered_items", "Items in the last rendered view.");
    });
}
