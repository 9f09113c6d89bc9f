// src/config.rs
//! Run configuration: what to fetch, how to render it, and how many items to
//! show. `AggregationConfig` is the in-memory form handed to `Funnel::start`;
//! `FunnelSettings` is the on-disk form (TOML or JSON) the binaries load.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;

pub const ENV_CONFIG_PATH: &str = "FUNNEL_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/funnel.toml";
pub const DEFAULT_JSON_PATH: &str = "config/funnel.json";

const DEFAULT_MAX_ITEMS: usize = 10;

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}

fn default_user_agent() -> String {
    format!("activity-funnel/{}", env!("CARGO_PKG_VERSION"))
}

/// Template selection for one source: one template for every item, or one
/// per item kind for providers with several post types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateRef {
    Single(String),
    PerKind(BTreeMap<String, String>),
}

impl TemplateRef {
    /// Template name for an item of `kind`. `PerKind` needs a kind that is mapped.
    pub fn for_kind(&self, kind: Option<&str>) -> Option<&str> {
        match self {
            TemplateRef::Single(name) => Some(name.as_str()),
            TemplateRef::PerKind(map) => kind.and_then(|k| map.get(k)).map(String::as_str),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            TemplateRef::Single(name) => vec![name.as_str()],
            TemplateRef::PerKind(map) => map.values().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for TemplateRef {
    fn from(name: &str) -> Self {
        TemplateRef::Single(name.to_string())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for TemplateRef {
    fn from(pairs: [(&str, &str); N]) -> Self {
        TemplateRef::PerKind(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// One configured source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRequest {
    /// Stable id for items of this source. Defaults to `{provider}-{index}`.
    #[serde(default)]
    pub id: Option<String>,
    /// Provider type, e.g. `twitter`.
    #[serde(alias = "name")]
    pub provider: String,
    /// Account / blog / user name at the provider.
    #[serde(default)]
    pub user: String,
    #[serde(alias = "tpl")]
    pub template: TemplateRef,
    /// Extra provider-specific parameters (API keys, tags, ...).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl SourceRequest {
    pub fn new(
        provider: impl Into<String>,
        user: impl Into<String>,
        template: impl Into<TemplateRef>,
    ) -> Self {
        Self {
            id: None,
            provider: provider.into(),
            user: user.into(),
            template: template.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Id of this source at position `index` of the source list.
    pub fn source_id(&self, index: usize) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => format!("{}-{}", self.provider.to_ascii_lowercase(), index),
        }
    }
}

/// Called once per run after every source settled.
pub type OnSettled = Box<dyn FnOnce() + Send + 'static>;

/// Everything one run needs. Immutable once handed to `Funnel::start`.
pub struct AggregationConfig {
    pub sources: Vec<SourceRequest>,
    pub max_items: usize,
    pub on_settled: Option<OnSettled>,
}

impl AggregationConfig {
    pub fn new(sources: Vec<SourceRequest>, max_items: usize) -> Self {
        Self {
            sources,
            max_items,
            on_settled: None,
        }
    }

    pub fn on_settled<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_settled = Some(Box::new(f));
        self
    }

    /// Structural checks that need no registry: source count, cap, id uniqueness.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.sources.is_empty() {
            return Err(ConfigurationError::NoSources);
        }
        if self.max_items == 0 {
            return Err(ConfigurationError::ZeroMaxItems);
        }
        let mut seen = HashSet::new();
        for id in self.source_ids() {
            if !seen.insert(id.clone()) {
                return Err(ConfigurationError::DuplicateSourceId(id));
            }
        }
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, s)| s.source_id(i))
            .collect()
    }

    /// Each source's share of the cap, rounded up.
    pub fn per_source_limit(&self) -> usize {
        if self.sources.is_empty() {
            return self.max_items;
        }
        self.max_items.div_ceil(self.sources.len())
    }
}

impl fmt::Debug for AggregationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationConfig")
            .field("sources", &self.sources)
            .field("max_items", &self.max_items)
            .field("on_settled", &self.on_settled.is_some())
            .finish()
    }
}

/// On-disk settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSettings {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Per-fetch timeout; a fetch exceeding it settles as a failure.
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Template name → template source.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub sources: Vec<SourceRequest>,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            fetch_timeout_secs: None,
            user_agent: default_user_agent(),
            templates: BTreeMap::new(),
            sources: Vec::new(),
        }
    }
}

impl FunnelSettings {
    pub fn to_config(&self) -> AggregationConfig {
        AggregationConfig::new(self.sources.clone(), self.max_items)
    }
}

/// Load settings from an explicit path. Supports TOML or JSON.
pub fn load_settings_from(path: &Path) -> Result<FunnelSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading funnel settings from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_settings(&content, ext.as_str())
        .with_context(|| format!("parsing funnel settings in {}", path.display()))
}

/// Load settings using env var + fallbacks:
/// 1) $FUNNEL_CONFIG_PATH
/// 2) config/funnel.toml
/// 3) config/funnel.json
/// 4) defaults (no sources)
pub fn load_settings_default() -> Result<FunnelSettings> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_settings_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_settings_from(&p);
        }
    }
    Ok(FunnelSettings::default())
}

fn parse_settings(s: &str, hint_ext: &str) -> Result<FunnelSettings> {
    let looks_json = s.trim_start().starts_with('{');
    if hint_ext == "json" || (hint_ext != "toml" && looks_json) {
        if let Ok(v) = serde_json::from_str(s) {
            return Ok(v);
        }
    }
    match toml::from_str::<FunnelSettings>(s) {
        Ok(v) => Ok(v),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!(toml_err))
            .context("unsupported settings format"),
    }
}
