//! Netdecoy - a multi-protocol network decoy
//!
//! Binds a set of TCP ports that impersonate real services:
//! - HTTP: static page with captured request bytes
//! - Banner: SSH/Telnet-style greeting, captures the peer's reply
//! - Generic: raw TCP capture with optional echo
//!
//! Every byte exchanged is appended to a JSON-lines interaction log.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use netdecoy::config::Config;
use netdecoy::listener::ListenerSet;
use netdecoy::log::{self, JsonlSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Initialize logging based on LOG_FORMAT env var
    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(tracing_subscriber::filter::LevelFilter::INFO)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .init();
    }

    info!("Starting netdecoy...");

    let config = Config::load()?;
    info!("Configuration loaded ({} listeners)", config.listeners.len());

    // A sink that cannot be opened at startup is the one log failure worth
    // stopping for; everything later is swallowed by the writer.
    let sink = JsonlSink::new(&config.log_dir)?;
    info!("Recording interactions to {}", sink.path().display());
    let recorder = log::start_writer(Box::new(sink));

    let listeners = ListenerSet::start(&config.server.host, &config.listeners, recorder).await?;
    info!(
        "{} of {} listeners started",
        listeners.handles().len(),
        config.listeners.len()
    );

    shutdown_signal().await;
    info!("Shutdown requested, closing listeners");
    listeners.shutdown();

    Ok(())
}

/// Completes on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
