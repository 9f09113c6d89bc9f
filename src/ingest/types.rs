// src/ingest/types.rs
use anyhow::Result;
use std::collections::BTreeMap;

use crate::item::NormalizedItem;

/// Parameters of one source's fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Id every produced item must carry.
    pub source_id: String,
    pub user: String,
    pub params: BTreeMap<String, String>,
    /// This source's share of the run's cap; providers that take a count use it.
    pub limit: usize,
}

impl FetchRequest {
    pub fn new(source_id: impl Into<String>, user: impl Into<String>, limit: usize) -> Self {
        Self {
            source_id: source_id.into(),
            user: user.into(),
            params: BTreeMap::new(),
            limit,
        }
    }
}

/// A provider: fetches a source and maps its native response into items.
/// Entries of unsupported kinds are left out, not reported as errors.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<NormalizedItem>>;
    fn name(&self) -> &'static str;
}
