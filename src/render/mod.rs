// src/render/mod.rs
//! Turning the capped view into display fragments and handing them to the
//! presentation surface.

pub mod sink;
pub mod template;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::TemplateRef;
use crate::item::NormalizedItem;

pub use sink::{MemorySink, SharedView};
pub use template::{relative_date, TemplateRenderer};

/// One rendered entry of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedFragment {
    pub source_id: String,
    pub kind: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub html: String,
}

/// Template engine seam. `now` is the clock relative dates are computed
/// against; callers keep it fixed for the whole run.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        template: &str,
        item: &NormalizedItem,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String>;
    fn has_template(&self, name: &str) -> bool;
}

/// Presentation surface. Receives the complete current view on every call,
/// never a delta. Must not panic back into the aggregation path.
pub trait RenderSink: Send + Sync {
    fn replace(&self, fragments: &[RenderedFragment]);
}

/// Render every item of `view` in order. Items whose template cannot be
/// resolved or rendered are logged and left out of this pass.
pub fn render_view(
    renderer: &dyn Renderer,
    templates: &HashMap<String, TemplateRef>,
    view: &[&NormalizedItem],
    now: DateTime<Utc>,
) -> Vec<RenderedFragment> {
    let mut out = Vec::with_capacity(view.len());
    for item in view {
        let Some(template) = templates
            .get(&item.source_id)
            .and_then(|t| t.for_kind(item.kind.as_deref()))
        else {
            tracing::warn!(
                source_id = %item.source_id,
                kind = ?item.kind,
                "no template for item; skipping"
            );
            continue;
        };

        match renderer.render(template, item, now) {
            Ok(html) => out.push(RenderedFragment {
                source_id: item.source_id.clone(),
                kind: item.kind.clone(),
                timestamp: item.timestamp,
                html,
            }),
            Err(e) => {
                tracing::warn!(error = ?e, source_id = %item.source_id, template, "render failed");
            }
        }
    }
    out
}
