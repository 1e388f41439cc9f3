mod cli;
mod exporter;
mod metrics;
mod server;
mod session;
mod shutdown;
mod types;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::Registry;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::exporter::TelemetryCollector;
use crate::session::{JetsonSession, SessionOptions};
use crate::shutdown::ShutdownHook;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let hook = ShutdownHook::new();

    let session = tokio::task::spawn_blocking(|| JetsonSession::open(SessionOptions::default()))
        .await
        .context("telemetry session task failed")?
        .context("failed to open telemetry session")?;

    let collector = TelemetryCollector::new(Arc::new(session), &hook)
        .context("telemetry not available")?;

    let registry = Registry::new();
    registry
        .register(Box::new(collector))
        .context("failed to register telemetry collector")?;

    let result = server::serve(registry, args.port, shutdown::signal()).await;
    hook.run();
    result
}
