//! News Curator — Binary Entrypoint
//! Loads config, fetches records from the configured JSON inputs, runs the
//! curation pipeline once and hands the digest to the JSON renderer.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_curator::config::CurationConfig;
use news_curator::generation::build_generator;
use news_curator::handoff::{deliver, DeliveredStore, JsonFileDeliveredStore, JsonFileRenderer};
use news_curator::ingest::{fetch_all, types::SourceProvider, JsonFileProvider};
use news_curator::metrics::Metrics;
use news_curator::pipeline::Pipeline;

/// Compact logs by default; JSON lines when CURATOR_LOG_JSON=1.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_curator=info,warn"));

    let json = std::env::var("CURATOR_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = CurationConfig::load_default().context("loading configuration")?;
    let metrics = Metrics::init()?;

    let providers: Vec<Box<dyn SourceProvider>> = config
        .paths
        .inputs
        .iter()
        .map(|p| Box::new(JsonFileProvider::new(p)) as Box<dyn SourceProvider>)
        .collect();
    let records = fetch_all(&providers, config.pipeline.max_concurrency).await;

    let store = JsonFileDeliveredStore::new(&config.paths.delivered);
    let delivered = store.load().await.context("loading delivered set")?;

    let renderer = JsonFileRenderer::new(&config.paths.output);
    let metrics_path = config.paths.metrics.clone();
    let output_path = config.paths.output.clone();

    let generator = build_generator(&config.generation)?;
    tracing::info!(
        target: "pipeline",
        provider = generator.provider_name(),
        sources = providers.len(),
        records = records.len(),
        "starting run"
    );
    let pipeline = Pipeline::standard(config, generator)?;
    tracing::debug!(target: "pipeline", stages = ?pipeline.stage_names(), "stages assembled");

    let digest = pipeline.run(records, &delivered).await?;
    let delivered_now = deliver(&digest, &renderer, &store).await?;
    tracing::info!(
        target: "handoff",
        output = %output_path.display(),
        items = digest.items.len(),
        delivered = delivered_now,
        "digest written"
    );

    if let Some(path) = metrics_path {
        metrics
            .write_textfile(&path)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }
    Ok(())
}
