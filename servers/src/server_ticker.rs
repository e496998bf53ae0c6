//! # Ticker Server
//!
//! Pushes the current time to every WebSocket client that asks for it.
//! A client sends `{"type":"stream"}` to start receiving one timestamp per
//! configured interval and `{"type":"cancel"}` to stop. Disconnecting, or
//! stopping the server, ends the stream as well.

use anyhow::Result;
use lib_common::streams::PeriodicStreamProducer;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod ticker_logic;
use ticker_logic::{config, downstream, logger, state};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config()?;
    logger::setup_logging(&config.log_dir(), config.log_level())?;

    let shutdown = CancellationToken::new();
    let producer = PeriodicStreamProducer::new(config.interval())?.with_name("ticker");
    log::info!("Streaming one timestamp every {:?} on {}", producer.interval(), config.endpoint());
    let app_state = state::AppState::new(producer, shutdown.clone());

    let mut downstream_handle = tokio::spawn(downstream::run(config.clone(), app_state.clone()));

    // Wait for shutdown signal, or for the server to stop on its own
    tokio::select! {
        finished = &mut downstream_handle => {
            return finished?;
        }
        received = wait_for_signal() => {
            received?;
        }
    }

    // Stop every stream and let the server drain
    shutdown.cancel();
    downstream_handle.await??;

    log::info!("Shutdown complete.");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            ctrl_c = signal::ctrl_c() => {
                ctrl_c?;
                log::info!("Ctrl-C received, initiating shutdown.");
            }
            _ = term_signal.recv() => {
                log::info!("SIGTERM received, initiating shutdown.");
            }
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        log::info!("Ctrl-C received, initiating shutdown.");
    }
    Ok(())
}
