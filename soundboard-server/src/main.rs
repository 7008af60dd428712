//! Soundboard server - Main entry point
//!
//! Clients upload short clips and toggle their playback on the server's
//! audio output over a WebSocket; every client sees the same play/stop
//! state in real time.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use soundboard_common::config::FileConfig;
use soundboard_server::api::{self, AppContext};
use soundboard_server::audio::{AudioOutput, AudioSink, NullSink};
use soundboard_server::config::{CliOverrides, Config};
use soundboard_server::library::SoundLibrary;
use soundboard_server::playback::{AssetCache, PlaybackController};
use soundboard_server::ws::NotificationHub;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for soundboard-server
#[derive(Parser, Debug)]
#[command(name = "soundboard-server")]
#[command(about = "Shared soundboard with server-side playback")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SOUNDBOARD_PORT")]
    port: Option<u16>,

    /// Folder holding uploaded sounds (env: SOUNDBOARD_UPLOADS)
    #[arg(short, long)]
    uploads_folder: Option<PathBuf>,

    /// Folder with the web client (env: SOUNDBOARD_STATIC)
    #[arg(long)]
    static_folder: Option<PathBuf>,

    /// Config file (default: <config dir>/soundboard/config.toml)
    #[arg(short, long, env = "SOUNDBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Audio output device name (default: system default device)
    #[arg(short, long, env = "SOUNDBOARD_DEVICE")]
    device: Option<String>,

    /// Discard audio at real-time pace instead of opening a device
    #[arg(long)]
    null_output: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soundboard_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let file_config =
        FileConfig::load(args.config.as_deref()).context("Failed to load config file")?;
    let config = Config::resolve(
        CliOverrides {
            port: args.port,
            uploads_folder: args.uploads_folder,
            static_folder: args.static_folder,
            audio_device: args.device,
            null_output: args.null_output,
        },
        file_config,
    );

    info!("Starting soundboard server on port {}", config.port);
    info!("Uploads folder: {}", config.uploads_folder.display());
    info!("Static folder: {}", config.static_folder.display());
    if !config.loudness.is_unity() {
        info!("Loudness: {:?}", config.loudness);
    }

    std::fs::create_dir_all(&config.uploads_folder).with_context(|| {
        format!(
            "Failed to create uploads folder {}",
            config.uploads_folder.display()
        )
    })?;

    // No output device means nothing to do: fail startup
    let sink: Arc<dyn AudioSink> = if config.null_output {
        info!("Using null audio output");
        Arc::new(NullSink::realtime())
    } else {
        let output = AudioOutput::open(config.audio_device.clone(), config.output_buffer_ms)
            .context("Failed to open audio output")?;
        info!("Audio output: {}", output.device_name());
        Arc::new(output)
    };

    let library = Arc::new(SoundLibrary::new(config.uploads_folder.clone()));
    let cache = Arc::new(AssetCache::with_loudness(library.clone(), config.loudness));
    let hub = Arc::new(NotificationHub::new(config.outbox_capacity));
    let controller = PlaybackController::new(cache, sink, Arc::clone(&hub));

    let config = Arc::new(config);
    let ctx = AppContext::new(library, Arc::clone(&controller), Arc::clone(&hub), config);

    // WebSocket clients hold their connections open; close them once the
    // signal arrives so graceful shutdown can complete
    let shutdown_hub = Arc::clone(&hub);
    let shutdown = async move {
        shutdown_signal().await;
        shutdown_hub.close_all();
    };

    let served = api::run(ctx, shutdown).await;

    hub.close_all();
    controller.stop_all().await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e).context("HTTP server failed");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
