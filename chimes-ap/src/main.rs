//! Ledger Chimes Audio Player (chimes-ap) - Main entry point
//!
//! Composition root: loads configuration, owns the single engine and stream
//! client instances, wires the record fan-out between them, and ties their
//! lifecycle to session start/stop rather than process lifetime.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chimes_ap::ledger::client::{ClientConfig, LedgerStreamClient};
use chimes_ap::sonify::SonificationEngine;
use chimes_common::{ChimesEvent, Config, EventBus, Notifier};

/// Command-line arguments for chimes-ap
#[derive(Parser, Debug)]
#[command(name = "chimes-ap")]
#[command(about = "Live ledger transactions as generative music")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LEDGER_CHIMES_CONFIG")]
    config: Option<PathBuf>,

    /// Ledger endpoint override (repeatable)
    #[arg(short, long = "endpoint")]
    endpoint: Vec<String>,

    /// Style profile: techno, jazz, reggaeton, vaporwave
    #[arg(short, long, env = "LEDGER_CHIMES_STYLE")]
    style: Option<String>,

    /// Audio output device name
    #[arg(short, long, env = "LEDGER_CHIMES_DEVICE")]
    device: Option<String>,

    /// Master volume (0.0-1.0)
    #[arg(short, long, env = "LEDGER_CHIMES_VOLUME")]
    volume: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chimes_ap=debug,chimes_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments and resolve configuration
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if !args.endpoint.is_empty() {
        config.network.endpoints = args.endpoint.clone();
    }
    if let Some(style) = &args.style {
        config.engine.style = style.clone();
    }
    if let Some(device) = &args.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(volume) = args.volume {
        config.audio.volume = volume;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting Ledger Chimes (style {}, {} endpoints)",
        config.engine.style,
        config.network.endpoints.len()
    );

    // Explicit instances owned here; no ambient globals
    let events = EventBus::new(1000);
    let notifier = Arc::new(Notifier::new());

    let engine = Arc::new(
        SonificationEngine::new(&config.engine, &config.audio, events.clone())
            .context("Failed to initialize sonification engine")?,
    );
    let client = LedgerStreamClient::new(
        ClientConfig::from(&config.network),
        Arc::clone(&notifier),
        events.clone(),
    );

    // Record fan-out: every accepted transaction reaches the engine
    {
        let engine = Arc::clone(&engine);
        notifier.subscribe(move |record| {
            engine.on_transaction(record);
            Ok(())
        });
    }

    engine.start().context("Failed to start engine")?;
    client.connect().context("Failed to start stream client")?;

    // Run until interrupted or the client exhausts its reconnection budget
    let mut rx = events.subscribe();
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown requested");
        }
        reason = await_termination(&mut rx) => {
            error!("Stream client terminated: {}", reason);
        }
    }

    client.disconnect().await;
    engine.stop();
    info!("Shutdown complete");
    Ok(())
}

/// Wait for a fatal ClientTerminated event
async fn await_termination(
    rx: &mut tokio::sync::broadcast::Receiver<ChimesEvent>,
) -> String {
    loop {
        match rx.recv().await {
            Ok(ChimesEvent::ClientTerminated { reason, .. }) => return reason,
            Ok(_) => continue,
            Err(_) => return "event bus closed".to_string(),
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
