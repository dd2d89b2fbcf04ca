//! Chess wager arbiter binary.
//!
//! Composition root that assembles:
//! 1. Runtime (game sessions) over the file repository
//! 2. Settlement coordinator, registered as a terminal hook
//! 3. TCP transport speaking line-delimited JSON
//!
//! # Examples
//!
//! ```bash
//! JUDGE_PRIVATE_KEY=0x... CHESS_CONTRACT_ADDRESS=0x... cargo run -p arbiter
//! ```
mod logging;
mod tcp;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;

use runtime::{EventBus, FileRepository, Runtime, RuntimeConfig};
use settlement::{SettlementConfig, SettlementCoordinator, UnconfiguredLedger};

use crate::tcp::{Server, TcpTransport};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7878";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    // 1. Load configuration from environment
    let runtime_config = RuntimeConfig::from_env();
    let settlement_config =
        SettlementConfig::from_env().context("loading settlement configuration")?;
    let listen_addr =
        std::env::var("ARBITER_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());

    // 2. Setup logging
    let _log_guard = logging::setup_logging(&runtime_config.data_dir)?;

    tracing::info!("Starting chess arbiter");
    tracing::info!("Data directory: {}", runtime_config.data_dir.display());
    tracing::info!(
        "Time control: {}ms + {}ms",
        runtime_config.game.base_time_ms,
        runtime_config.game.increment_ms
    );

    // 3. Shared infrastructure
    let repository = Arc::new(
        FileRepository::new(&runtime_config.data_dir).context("opening game repository")?,
    );
    let event_bus = EventBus::with_capacity(runtime_config.event_buffer_size);

    // 4. Settlement
    let coordinator = Arc::new(
        SettlementCoordinator::new(
            &settlement_config,
            repository.clone(),
            Arc::new(UnconfiguredLedger),
        )?
        .with_event_bus(event_bus.clone()),
    );
    tracing::info!(
        "Judge address: {}, contract: {}",
        coordinator.judge_address(),
        coordinator.contract()
    );

    // 5. Runtime
    let transport = Arc::new(TcpTransport::new());
    let runtime = Arc::new(
        Runtime::builder()
            .config(runtime_config)
            .repository(repository)
            .transport(transport.clone())
            .event_bus(event_bus)
            .hook(coordinator.clone())
            .build()
            .await?,
    );

    // 6. Listener
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    tracing::info!("Listening on {listen_addr}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = Arc::new(Server {
        runtime: runtime.clone(),
        coordinator,
        transport,
    });
    let listener_task = tokio::spawn(tcp::serve(listener, server, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    listener_task.await.context("joining listener")??;

    // Every connection is closed, so the runtime has no other owner left.
    match Arc::try_unwrap(runtime) {
        Ok(runtime) => runtime.shutdown().await?,
        Err(_) => tracing::warn!("Runtime still shared, skipping graceful shutdown"),
    }

    tracing::info!("Arbiter shutdown complete");
    Ok(())
}
