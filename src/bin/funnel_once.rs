//! One-shot run: fetch every configured source, wait until all settled and
//! print the final rendered timeline to stdout.
//!
//! Usage: `funnel_once [settings.toml|settings.json]`
//! Without an argument, settings come from `$FUNNEL_CONFIG_PATH` or `config/`.

use std::path::PathBuf;
use std::sync::Arc;

use activity_funnel::config::{load_settings_default, load_settings_from};
use activity_funnel::render::{SharedView, TemplateRenderer};
use activity_funnel::{AdapterRegistry, Funnel};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("activity_funnel=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = match std::env::args().nth(1) {
        Some(p) => load_settings_from(&PathBuf::from(p))?,
        None => load_settings_default()?,
    };

    let registry = AdapterRegistry::from_settings(&settings)?;
    let renderer = Arc::new(TemplateRenderer::from_map(&settings.templates));
    let view = Arc::new(SharedView::new());
    let funnel = Funnel::new(registry, renderer, view.clone());

    let report = funnel.start(settings.to_config())?.wait().await?;
    tracing::info!(
        settled = report.settled,
        expected = report.expected,
        failed = ?report.failed_sources,
        rendered = report.rendered,
        "funnel-once done"
    );

    println!("{}", view.html());
    Ok(())
}
