//! Carry ledger server binary

use anyhow::Context;
use carry_ledger::{ClockSequence, Config, Ledger};
use std::sync::Arc;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting DelTran Carry Ledger");

    // Load configuration
    let config = match std::env::var("CARRY_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env()?,
    };

    let ledger = Ledger::open(config, Arc::new(ClockSequence))
        .await
        .context("opening carry ledger")?;
    tracing::info!(
        operator = %ledger.operator(),
        state = ?ledger.get_state(),
        "Ledger opened successfully"
    );

    // Log every committed event for downstream indexers
    let mut events = ledger.subscribe();
    let indexer = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => tracing::info!(target: "carry_events", "{}", json),
                    Err(e) => tracing::error!("Failed to encode event: {}", e),
                },
                Err(e) => tracing::warn!("Event subscriber lagged: {}", e),
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down carry ledger");
    ledger.shutdown().await?;
    indexer.abort();
    Ok(())
}
