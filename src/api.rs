//! HTTP surface: serves the latest rendered timeline and lets clients start
//! a fresh run. Starting a run cancels the previous one first, so only one
//! run ever writes to the shared view.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::config::{load_settings_default, FunnelSettings};
use crate::error::ConfigurationError;
use crate::funnel::{Funnel, RunHandle};
use crate::ingest::AdapterRegistry;
use crate::render::{RenderedFragment, Renderer, SharedView, TemplateRenderer};

#[derive(Clone)]
pub struct AppState {
    funnel: Arc<Funnel>,
    view: Arc<SharedView>,
    settings: Arc<FunnelSettings>,
    current: Arc<Mutex<Option<RunHandle>>>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResp {
    pub run: u64,
    pub sources: usize,
    pub max_items: usize,
}

#[derive(Serialize)]
struct FeedResp {
    settled: bool,
    items: Vec<RenderedFragment>,
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
}

impl AppState {
    /// State rendering with the templates declared in `settings`.
    pub fn new(settings: FunnelSettings, registry: AdapterRegistry) -> Self {
        let renderer = Arc::new(TemplateRenderer::from_map(&settings.templates));
        Self::with_renderer(settings, registry, renderer)
    }

    pub fn with_renderer(
        settings: FunnelSettings,
        registry: AdapterRegistry,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let view = Arc::new(SharedView::new());
        let funnel = Funnel::new(registry, renderer, view.clone());
        Self {
            funnel: Arc::new(funnel),
            view,
            settings: Arc::new(settings),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn view(&self) -> Arc<SharedView> {
        self.view.clone()
    }

    pub fn settings(&self) -> &FunnelSettings {
        &self.settings
    }

    /// Cancel the current run (if any) and start a new one from the settings.
    pub async fn refresh(&self) -> Result<RefreshResp, ConfigurationError> {
        let mut current = self.current.lock().await;
        if let Some(prev) = current.take() {
            prev.cancel().await;
        }

        let was_settled = self.view.is_settled();
        self.view.begin_run();
        let view = self.view.clone();
        let config = self.settings.to_config().on_settled(move || view.mark_settled());

        match self.funnel.start(config) {
            Ok(handle) => {
                let resp = RefreshResp {
                    run: handle.run_id(),
                    sources: handle.expected(),
                    max_items: self.settings.max_items,
                };
                *current = Some(handle);
                Ok(resp)
            }
            Err(e) => {
                if was_settled {
                    self.view.mark_settled();
                }
                Err(e)
            }
        }
    }

    /// Wait for the current run to finish. Used by tests and the one-shot binary.
    pub async fn wait_current(&self) -> Option<anyhow::Result<crate::aggregator::RunReport>> {
        let handle = self.current.lock().await.take()?;
        Some(handle.wait().await)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/feed", get(feed_html))
        .route("/feed.json", get(feed_json))
        .route("/refresh", post(refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Full application: settings from disk/env, built-in providers, initial run,
/// and `/metrics` when the Prometheus recorder could be installed.
pub async fn app() -> anyhow::Result<Router> {
    let settings = load_settings_default()?;
    let registry = AdapterRegistry::from_settings(&settings)?;
    let state = AppState::new(settings, registry);

    if !state.settings().sources.is_empty() {
        if let Err(e) = state.refresh().await {
            tracing::warn!(error = %e, "initial run not started");
        }
    }

    let mut app = router(state);
    match crate::metrics::prometheus_handle() {
        Ok(handle) => app = app.merge(crate::metrics::router(handle)),
        Err(e) => tracing::warn!(error = ?e, "metrics disabled"),
    }
    Ok(app)
}

async fn feed_html(State(state): State<AppState>) -> Html<String> {
    Html(state.view.html())
}

async fn feed_json(State(state): State<AppState>) -> Json<FeedResp> {
    Json(FeedResp {
        settled: state.view.is_settled(),
        items: state.view.fragments(),
    })
}

async fn refresh(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RefreshResp>), (StatusCode, Json<ErrorResp>)> {
    match state.refresh().await {
        Ok(resp) => Ok((StatusCode::ACCEPTED, Json(resp))),
        Err(e) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResp {
                error: e.to_string(),
            }),
        )),
    }
}
