// src/render/sink.rs
use std::sync::{Mutex, RwLock};

use super::{RenderSink, RenderedFragment};

/// Latest view of the timeline, shared with the HTTP surface.
#[derive(Debug, Default)]
pub struct SharedView {
    inner: RwLock<ViewState>,
}

#[derive(Debug, Default, Clone)]
struct ViewState {
    fragments: Vec<RenderedFragment>,
    settled: bool,
    replacements: u64,
}

impl SharedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new run is starting: the current fragments stay visible until its
    /// first settlement replaces them, but the view is no longer final.
    pub fn begin_run(&self) {
        let mut st = self.inner.write().expect("shared view lock poisoned");
        st.settled = false;
    }

    /// Completion hook for the run that feeds this view.
    pub fn mark_settled(&self) {
        let mut st = self.inner.write().expect("shared view lock poisoned");
        st.settled = true;
    }

    pub fn is_settled(&self) -> bool {
        self.inner.read().expect("shared view lock poisoned").settled
    }

    pub fn fragments(&self) -> Vec<RenderedFragment> {
        self.inner
            .read()
            .expect("shared view lock poisoned")
            .fragments
            .clone()
    }

    /// Number of `replace` calls received so far.
    pub fn replacements(&self) -> u64 {
        self.inner.read().expect("shared view lock poisoned").replacements
    }

    /// Fragments concatenated in display order.
    pub fn html(&self) -> String {
        let st = self.inner.read().expect("shared view lock poisoned");
        st.fragments
            .iter()
            .map(|f| f.html.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl RenderSink for SharedView {
    fn replace(&self, fragments: &[RenderedFragment]) {
        let mut st = self.inner.write().expect("shared view lock poisoned");
        st.fragments = fragments.to_vec();
        st.replacements += 1;
    }
}

// --- Test helper ---
/// Records every `replace` call in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub calls: Mutex<Vec<Vec<RenderedFragment>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<RenderedFragment>> {
        self.calls.lock().expect("memory sink mutex poisoned").clone()
    }

    pub fn last(&self) -> Option<Vec<RenderedFragment>> {
        self.calls
            .lock()
            .expect("memory sink mutex poisoned")
            .last()
            .cloned()
    }
}

impl RenderSink for MemorySink {
    fn replace(&self, fragments: &[RenderedFragment]) {
        self.calls
            .lock()
            .expect("memory sink mutex poisoned")
            .push(fragments.to_vec());
    }
}
