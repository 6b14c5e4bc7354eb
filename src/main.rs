//! Paperframe: slideshow and image-feed server for Inky e-paper displays
//!
//! A Rust-based server that:
//! - Detects the attached Inky board, or uses the configured display type
//! - Cycles through uploaded images, or polls an image feed URL
//! - Dithers every frame to the panel palette before display
//! - Exposes a JSON API for configuration
//! - Runs as a systemd service with graceful shutdown

mod config;
mod display;
mod image_proc;
mod models;
mod services;
mod store;
mod web;
mod worker;

use clap::Parser;
use config::AppConfig;
use display::{DisplayProvider, HardwareProvider, MockProvider, MockRecorder};
use services::Services;
use std::sync::Arc;
use std::time::Duration;
use store::JsonFileStore;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "paperframe")]
#[command(about = "Slideshow and image-feed server for Inky e-paper displays")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Web server port (overrides config, default: 8080)
    #[arg(long = "http-port")]
    http_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run without display hardware, frames are kept in memory
    #[arg(long)]
    desktop: bool,

    /// Print the detected display and exit
    #[arg(long)]
    detect: bool,
}

/// Using current_thread runtime for single-core Pi Zero W
/// This reduces memory overhead and avoids thread synchronization costs
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_result = AppConfig::load(&args.config);
    let mut config = config_result.as_ref().cloned().unwrap_or_default();
    config.verbose |= args.verbose;
    config.desktop |= args.desktop;
    if let Some(port) = args.http_port {
        config.web_port = port;
    }

    // Initialize logging
    init_logging(config.verbose);

    tracing::info!("Starting paperframe");
    if let Err(e) = &config_result {
        tracing::warn!("Failed to load config from {}: {}", args.config, e);
        tracing::info!("Using default configuration");
    }
    config.validate()?;

    let provider: Arc<dyn DisplayProvider> = if config.desktop {
        tracing::info!("Desktop mode, no display hardware will be used");
        Arc::new(MockProvider::new(MockRecorder::new()))
    } else {
        Arc::new(HardwareProvider::new())
    };

    // Handle one-shot commands
    if args.detect {
        let detected = tokio::task::spawn_blocking({
            let provider = Arc::clone(&provider);
            move || provider.detect()
        })
        .await?;
        match detected {
            Ok(Some(panel)) => println!("{} ({})", panel.display_type, panel.colour_palette),
            Ok(None) => println!("No display detected"),
            Err(e) => println!("{e}"),
        }
        return Ok(());
    }

    let store = Arc::new(JsonFileStore::open(&config.data_dir)?);
    let services = Arc::new(Services::start(&config, store, provider).await?);

    // Setup shutdown signal handling
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Spawn web server task
    let web_server = web::WebServer::new(Arc::clone(&services));
    let port = config.web_port;
    let web_shutdown = shutdown_tx.subscribe();
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.run_with_shutdown(port, web_shutdown).await {
            tracing::error!("Web server error: {}", e);
        }
    });

    // Wait for shutdown signal
    wait_for_shutdown().await?;
    tracing::info!("Shutdown signal received");

    // Stop taking requests, then release the display hardware
    let _ = shutdown_tx.send(());
    tokio::select! {
        _ = web_handle => {},
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            tracing::warn!("Web server shutdown timeout");
        }
    }

    tokio::select! {
        _ = services.shutdown() => {},
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            tracing::warn!("Worker shutdown timeout");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
///
/// Default level is "warn" to minimize SD card wear from log writes.
/// Use --verbose flag for "debug" level during development/troubleshooting.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("paperframe={}", level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}
