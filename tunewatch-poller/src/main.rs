//! Tunewatch poller - Main entry point
//!
//! Starts the release-detection poll loop and the HTTP surface (health,
//! status, command endpoints). The poller is constructed and spawned
//! exactly once here; there is no lazily-checked "already started" flag.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunewatch_common::config::resolve_data_folder;
use tunewatch_common::db::{init_database, Store};
use tunewatch_poller::api::{self, AppContext};
use tunewatch_poller::fetch::{PlatformClients, SoundCloudFetcher, SpotifyFetcher};
use tunewatch_poller::notify::WebhookNotifier;
use tunewatch_poller::scheduler::{Poller, PollerConfig};
use tunewatch_poller::state::SharedState;

/// Command-line arguments for tunewatch-poller
#[derive(Parser, Debug)]
#[command(name = "tunewatch-poller")]
#[command(about = "Release notification poller for tracked artists")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5730", env = "TUNEWATCH_PORT")]
    port: u16,

    /// Data folder containing the state database
    #[arg(short, long, env = "TUNEWATCH_DATA_FOLDER")]
    data_folder: Option<String>,

    /// SoundCloud api-v2 client id
    #[arg(long, env = "SOUNDCLOUD_CLIENT_ID")]
    soundcloud_client_id: String,

    /// Spotify application client id
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    spotify_client_id: String,

    /// Spotify application client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET")]
    spotify_client_secret: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tunewatch_poller=debug,tunewatch_common=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let data_folder = resolve_data_folder(args.data_folder.as_deref(), "TUNEWATCH_DATA_FOLDER")
        .context("Failed to resolve data folder")?;
    info!("Starting tunewatch poller on port {}", args.port);
    info!("Data folder: {}", data_folder.display());

    // Initialize the state database
    let pool = init_database(&data_folder.join("tunewatch.db"))
        .await
        .context("Failed to initialize database")?;
    let store = Store::new(pool);

    // Poll loop configuration comes from the settings table
    let poller_config = PollerConfig::from_database(&store).await;

    let fetch_timeout_secs: u64 = store
        .setting("fetch_timeout_secs")
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);
    let fetch_items_limit: u32 = store
        .setting("fetch_items_limit")
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);

    // Platform fetchers and the webhook notifier
    let fetcher = PlatformClients {
        soundcloud: SoundCloudFetcher::new(
            args.soundcloud_client_id,
            fetch_timeout_secs,
            fetch_items_limit,
        )
        .context("Failed to build SoundCloud client")?,
        spotify: SpotifyFetcher::new(
            args.spotify_client_id,
            args.spotify_client_secret,
            fetch_timeout_secs,
        )
        .context("Failed to build Spotify client")?,
    };
    let notifier = WebhookNotifier::new(store.clone(), fetch_timeout_secs)
        .context("Failed to build webhook notifier")?;

    // Spawn the poll loop (started exactly once, here)
    let state = Arc::new(SharedState::new(tunewatch_common::time::now()));
    let poller = Poller::new(
        store.clone(),
        fetcher,
        notifier,
        poller_config,
        Arc::clone(&state),
    );
    tokio::spawn(poller.run());
    info!("Poll loop spawned");

    // Build and serve the HTTP surface
    let ctx = AppContext {
        store,
        state,
        port: args.port,
    };
    let app = api::create_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
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
