use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vigil_core::cluster::IdentityClusterer;
use vigil_core::embedder::OnnxEmbedder;
use vigil_report::ReportClient;

mod analysis;
mod collage;
mod config;
mod engine;
mod ingest;

use config::{Config, PolicyConfig};

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil edge video-analytics daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest detection snapshots on stdin and route alerts (default)
    Run,
    /// Run one batch analysis pass and exit
    Analyze,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::Analyze => {
            tokio::task::spawn_blocking(move || run_analysis_once(&config))
                .await
                .context("analysis task")?
        }
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    tracing::info!("vigild starting");

    let policy = Arc::new(PolicyConfig::load(&config.policy_path)?.into_table());
    let client = build_client(&config)?;

    // The ingest task owns stdin, the engine thread, and the alert path.
    let ingest_client = client.clone();
    let ingest_policy = Arc::clone(&policy);
    let buffer_cap = config.buffer_cap;
    let ingest_task = tokio::task::spawn_blocking(move || -> Result<()> {
        let stdin = std::io::stdin();
        let mut reader = stdin.lock();
        let header = ingest::read_header(&mut reader)?;
        tracing::info!(classes = header.classes.len(), "vocabulary received");
        let engine = engine::spawn_engine(
            header.classes,
            ingest_policy,
            Box::new(ingest_client),
            buffer_cap,
        )?;
        ingest::run(reader, &engine)
    });

    // Periodic batch analysis on its own blocking runs.
    let interval = Duration::from_secs(config.analysis_interval_secs.max(1));
    let model_path = config.model_path.clone();
    let threshold = config.similarity_threshold;
    let _analysis_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; analysis waits a full period.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let client = client.clone();
            let model_path = model_path.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                run_batch(&client, &model_path, threshold)
            })
            .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(error = %err, "analysis run failed"),
                Err(err) => tracing::error!(error = %err, "analysis task panicked"),
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("vigild shutting down");
        }
        result = ingest_task => {
            result.context("ingest task")??;
            tracing::info!("ingest stream ended; shutting down");
        }
    }
    Ok(())
}

/// Build the backend client and try to authenticate. A failed login is
/// logged, not fatal: the daemon keeps running and every send fails
/// fire-and-forget until restart, matching the alert path's semantics.
fn build_client(config: &Config) -> Result<ReportClient> {
    let mut client = ReportClient::new(
        &config.base_url,
        Duration::from_secs(config.http_timeout_secs),
    )?;
    if config.username.is_empty() {
        tracing::warn!("VIGIL_USERNAME not set; alert uploads will be rejected");
    } else if let Err(err) = client.authenticate(&config.username, &config.password) {
        tracing::warn!(error = %err, "authentication failed; alerts will be dropped");
    }
    Ok(client)
}

fn run_analysis_once(config: &Config) -> Result<()> {
    let client = build_client(config)?;
    run_batch(&client, &config.model_path, config.similarity_threshold)
}

/// One batch analysis run. The embedding model is loaded per run, keeping
/// the inference session off the daemon's steady-state footprint.
fn run_batch(client: &ReportClient, model_path: &Path, threshold: f32) -> Result<()> {
    let mut extractor = OnnxEmbedder::load(&model_path.to_string_lossy())
        .context("load embedding model")?;
    let clusterer = IdentityClusterer::new(threshold);
    analysis::run(client, &mut extractor, &clusterer)
}
