//! Binary entrypoint for the Brickflow API server.
use std::sync::Arc;

use anyhow::Context;
use brick_api::{serve, AppState};
use brick_expr::ChannelSandbox;
use brick_runtime::RuntimeConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = match std::env::var("BRICKFLOW_CONFIG") {
        Ok(path) => RuntimeConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => RuntimeConfig::default(),
    };
    config.apply_env().context("invalid environment override")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    // Default listen address can be overridden with BRICKFLOW_ADDR
    let addr = std::env::var("BRICKFLOW_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());

    let sandbox = Arc::new(ChannelSandbox::spawn(64));
    let state = AppState::new(config, sandbox).context("failed to register metrics")?;

    serve(&addr, state).await.context("server error")
}
