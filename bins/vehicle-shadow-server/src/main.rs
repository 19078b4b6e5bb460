mod http;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shadow_core::{default_catalog, load_settings, ShadowSettings, SignalStore};
use shadow_protocol::DiscoveryResponse;
use shadow_server::{ServerConfig, ShadowServer, STREAM_PATH};
use shadow_simulator::{run_demo, Producer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the settings file.
const CONFIG_ENV: &str = "VEHICLE_SHADOW_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,shadow_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Vehicle shadow starting...");

    let settings = read_settings()?;

    let catalog = settings.catalog.clone().unwrap_or_else(default_catalog);
    let store = Arc::new(SignalStore::with_catalog(settings.store.clone(), &catalog)?);

    let config = ServerConfig {
        name: settings.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        bind_addr: settings.ws_addr,
    };

    // Spawn WebSocket server
    let server = ShadowServer::new(config, Arc::clone(&store));
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    // Start HTTP API server
    let state = http::AppState {
        store: Arc::clone(&store),
        discovery: Arc::new(DiscoveryResponse::new(
            "localhost",
            settings.http_addr.port(),
            settings.ws_addr.port(),
            env!("CARGO_PKG_VERSION"),
        )),
    };
    let http_addr = settings.http_addr;
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http::serve(http_addr, state).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    // Start drive simulator
    let demo_handle = if settings.simulator.enabled {
        let producer = Producer::new(Arc::clone(&store));
        let period = Duration::from_millis(settings.simulator.period_ms.max(1));
        tokio::spawn(run_demo(producer, period))
    } else {
        tracing::info!("Drive simulator disabled");
        tokio::spawn(std::future::pending::<()>())
    };

    tracing::info!("🚗 Vehicle shadow ready!");
    tracing::info!("   WebSocket: ws://localhost:{}{}", settings.ws_addr.port(), STREAM_PATH);
    tracing::info!("   HTTP API:  http://localhost:{}/vehicle-shadow/v1", settings.http_addr.port());
    tracing::info!("   Discovery: http://localhost:{}/vehicle-shadow", settings.http_addr.port());

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = ws_handle => {
            tracing::warn!("WebSocket server stopped");
        }
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = demo_handle => {
            tracing::warn!("Drive simulator stopped");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Settings from `$VEHICLE_SHADOW_CONFIG` or the first argument, else defaults.
fn read_settings() -> anyhow::Result<ShadowSettings> {
    let path = std::env::var_os(CONFIG_ENV)
        .or_else(|| std::env::args_os().nth(1))
        .map(PathBuf::from);

    match path {
        Some(path) => {
            tracing::info!("Loading settings from {}", path.display());
            Ok(load_settings(&path)?)
        }
        None => {
            tracing::info!("No settings file given, using defaults");
            Ok(ShadowSettings::default())
        }
    }
}
