use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use selectivity::config::{init_rayon_threads, init_tracing, max_trials, server_port};
use selectivity::server::create_router;
use selectivity::{load_csv, LoadOptions};

#[derive(Parser)]
#[command(name = "selectivity-server")]
#[command(version)]
#[command(about = "HTTP API for selectivity estimates over one dataset")]
struct Cli {
    /// Delimited data file with a header row
    #[arg(short, long)]
    data: PathBuf,

    /// Trim whitespace around cells
    #[arg(long)]
    trim: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let port = server_port();
    let threads = init_rayon_threads();
    info!(threads, "starting selectivity API server");

    let options = LoadOptions {
        trim: cli.trim,
        ..LoadOptions::default()
    };
    let dataset = load_csv(&cli.data, &options)
        .with_context(|| format!("Failed to load dataset from {:?}", cli.data))?;
    let max_trials = max_trials();
    info!(max_trials, "per-request trial limit");
    let app = create_router(Arc::new(dataset), max_trials);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "server is running, press Ctrl+C to stop");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("stopping server");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
}
