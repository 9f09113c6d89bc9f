// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod aggregator;
pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod funnel;
pub mod ingest;
pub mod item;
pub mod metrics;
pub mod render;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::{Aggregator, RunReport, SourceOutcome, SourceResult};
pub use crate::api::{app, router};
pub use crate::completion::{CompletionTracker, Settlement};
pub use crate::config::{AggregationConfig, FunnelSettings, SourceRequest, TemplateRef};
pub use crate::error::ConfigurationError;
pub use crate::funnel::{Funnel, RunHandle};
pub use crate::ingest::{AdapterRegistry, FetchRequest, SourceAdapter};
pub use crate::item::NormalizedItem;
pub use crate::render::{RenderSink, RenderedFragment, Renderer};
