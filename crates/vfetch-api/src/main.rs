//! Axum API server binary.

use std::net::SocketAddr;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vfetch_api::{create_router, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vfetch=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting vfetch-api");

    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, download_dir={}",
        config.host,
        config.port,
        config.download_dir.display()
    );

    if config.ytdlp_bin.is_none() {
        if let Err(e) = vfetch_media::check_ytdlp() {
            warn!("{e}; extraction requests will fail until it is installed");
        }
    }

    let state = match AppState::new(config.clone()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {}", e);
            std::process::exit(1);
        }
    };

    // Background retention sweep for the persistent mode; the /cleanup
    // endpoint stays available for manual sweeps either way.
    if !config.ephemeral {
        let store = state.store.clone();
        let retention = config.retention;
        tokio::spawn(async move {
            let period = (retention / 4).max(std::time::Duration::from_secs(60));
            let mut tick = tokio::time::interval(period);
            tick.tick().await; // immediate first tick
            loop {
                tick.tick().await;
                let store = store.clone();
                let deleted =
                    tokio::task::spawn_blocking(move || store.cleanup_older_than(retention))
                        .await
                        .unwrap_or(0);
                if deleted > 0 {
                    info!(deleted, "Background cleanup removed expired downloads");
                }
            }
        });
    }

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
