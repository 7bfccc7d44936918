//! Jukebox service - Main entry point
//!
//! Wires the player facade, queue manager, change detector and HTTP API together and
//! tears them down in reverse order on Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jukebox::api::{self, AppContext};
use jukebox::detector::ChangeDetector;
use jukebox::fanout::Fanout;
use jukebox::player::{DbusPlayer, MemoryPlayer, PlayerBackend, PlayerControl};
use jukebox::queue::QueueManager;
use jukebox::search::YtDlpFinder;
use jukebox_common::config::{parse_listen_address, TomlConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for jukebox
#[derive(Parser, Debug)]
#[command(name = "jukebox")]
#[command(about = "Shared play queue for a desktop media player")]
#[command(version)]
struct Args {
    /// Listen address as host:port (overrides --address and --port)
    listen: Option<String>,

    /// Address to bind
    #[arg(short, long, env = "JUKEBOX_ADDRESS")]
    address: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "JUKEBOX_PORT")]
    port: Option<u16>,

    /// Bus name of the controlled player
    #[arg(short, long, env = "JUKEBOX_BUS_NAME")]
    bus_name: Option<String>,

    /// Configuration file
    #[arg(short, long, env = "JUKEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Drive an in-process player instead of one on the session bus
    #[arg(long, env = "JUKEBOX_LOOPBACK")]
    loopback: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting jukebox v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("JUKEBOX_GIT_HASH"),
        env!("JUKEBOX_BUILD_TIMESTAMP"),
        env!("JUKEBOX_BUILD_PROFILE")
    );

    let (address, port) = match args.listen.as_deref() {
        Some(listen) => parse_listen_address(listen).context("Invalid listen address")?,
        None => (
            args.address.unwrap_or(config.http.address.clone()),
            args.port.unwrap_or(config.http.port),
        ),
    };
    let bus_name = args.bus_name.unwrap_or(config.player.bus_name.clone());

    let backend: Arc<dyn PlayerBackend> = if args.loopback {
        warn!("Loopback mode: driving the in-process player, no media will play");
        Arc::new(MemoryPlayer::new())
    } else {
        Arc::new(
            DbusPlayer::session(bus_name.clone())
                .await
                .context("Failed to connect to the session bus")?,
        )
    };
    let player = PlayerControl::new(backend, bus_name, config.player.timeout());
    info!(
        "Controlling {} (timeout {:?})",
        player.bus_name(),
        player.timeout()
    );

    let fanout = Fanout::new(
        config.fanout.subscriber_capacity,
        config.fanout.publish_timeout(),
    );
    let queue = Arc::new(QueueManager::start(player.clone(), fanout).await);

    // Serving without change notifications would let the mirror drift silently
    let detector = ChangeDetector::start(&player, queue.clone(), config.detector.event_capacity)
        .await
        .context("Failed to subscribe to player changes")?;

    let finder = YtDlpFinder::new(
        config.search.program.clone(),
        config.search.query_format.clone(),
    );
    info!("Searching with {}", config.search.program);

    let ctx = AppContext {
        queue: queue.clone(),
        finder: Arc::new(finder),
    };

    let stop = CancellationToken::new();
    let mut server = tokio::spawn(api::run(address, port, ctx, stop.clone().cancelled_owned()));

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            // The server only stops on its own when it failed
            detector.shutdown().await;
            queue.shutdown().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("HTTP server failed"),
                Err(e) => Err(e).context("HTTP server task panicked"),
            };
        }
    }

    // No more player events, then end every SSE stream so the server can drain
    detector.shutdown().await;
    queue.shutdown().await;
    stop.cancel();

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error during shutdown: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    info!("Shutdown complete");
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
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
