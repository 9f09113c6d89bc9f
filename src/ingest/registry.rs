// src/ingest/registry.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::providers::{DeliciousProvider, TumblrProvider, TwitterProvider};
use super::types::{FetchRequest, SourceAdapter};
use crate::config::FunnelSettings;
use crate::item::NormalizedItem;

/// Provider-type identifier → adapter. Lookups are case-insensitive.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    fetch_timeout: Option<Duration>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the HTTP-backed `twitter`, `delicious` and `tumblr` providers.
    pub fn with_builtin_providers(client: reqwest::Client) -> Self {
        Self::new()
            .with("twitter", Arc::new(TwitterProvider::new(client.clone())))
            .with("delicious", Arc::new(DeliciousProvider::new(client.clone())))
            .with("tumblr", Arc::new(TumblrProvider::new(client)))
    }

    /// Built-in providers sharing one HTTP client configured from `settings`.
    pub fn from_settings(settings: &FunnelSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()
            .context("building provider http client")?;
        let registry = Self::with_builtin_providers(client);
        Ok(match settings.fetch_timeout_secs {
            Some(secs) if secs > 0 => registry.with_fetch_timeout(Duration::from_secs(secs)),
            _ => registry,
        })
    }

    pub fn with(mut self, provider: &str, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(provider, adapter);
        self
    }

    pub fn register(&mut self, provider: &str, adapter: Arc<dyn SourceAdapter>) {
        self.adapters
            .insert(provider.trim().to_ascii_lowercase(), adapter);
    }

    /// Wrap every resolved adapter so a hung fetch settles as a failure.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn resolve(&self, provider: &str) -> Option<Arc<dyn SourceAdapter>> {
        let adapter = self
            .adapters
            .get(&provider.trim().to_ascii_lowercase())?
            .clone();
        Some(match self.fetch_timeout {
            Some(timeout) => Arc::new(WithTimeout::new(adapter, timeout)),
            None => adapter,
        })
    }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Timeout layer around an adapter.
pub struct WithTimeout {
    inner: Arc<dyn SourceAdapter>,
    timeout: Duration,
}

impl WithTimeout {
    pub fn new(inner: Arc<dyn SourceAdapter>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl SourceAdapter for WithTimeout {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
        tokio::time::timeout(self.timeout, self.inner.fetch(req))
            .await
            .map_err(|_| {
                anyhow!(
                    "{} fetch for `{}` timed out after {:?}",
                    self.inner.name(),
                    req.source_id,
                    self.timeout
                )
            })?
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Never;

    #[async_trait]
    impl SourceAdapter for Never {
        async fn fetch(&self, _req: &FetchRequest) -> Result<Vec<NormalizedItem>> {
            std::future::pending().await
        }
        fn name(&self) -> &'static str {
            "never"
        }
    }

    #[test]
    fn resolves_case_insensitively() {
        let reg = AdapterRegistry::new().with("Never", Arc::new(Never));
        assert!(reg.resolve("NEVER").is_some());
        assert!(reg.resolve("never ").is_some());
        assert!(reg.resolve("other").is_none());
        assert_eq!(reg.providers(), vec!["never".to_string()]);
    }

    #[test]
    fn builtins_are_registered() {
        let reg = AdapterRegistry::with_builtin_providers(reqwest::Client::new());
        assert_eq!(reg.providers(), vec!["delicious", "tumblr", "twitter"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_turns_hang_into_error() {
        let reg = AdapterRegistry::new()
            .with("never", Arc::new(Never))
            .with_fetch_timeout(Duration::from_secs(5));
        let adapter = reg.resolve("never").unwrap();
        let err = adapter
            .fetch(&FetchRequest::new("n-0", "u", 3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(adapter.name(), "never");
    }
}
