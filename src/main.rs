//! Tabcache server
//!
//! Serves one `AdvancedCache<serde_json::Value>` over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabcache::api::{create_router, AppState};
use tabcache::cluster::{ClusterBus, ClusterTransport, NoopTransport};
use tabcache::storage::{FileStorage, KvStorage};
use tabcache::{AdvancedCache, CacheConfig};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the snapshot directory and pick the replication transport
/// 4. Start the cache (restores the snapshot, spawns background tasks)
/// 5. Serve the router until SIGINT/SIGTERM, then destroy the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tabcache server");

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: max_size={}, max_entries={}, default_ttl={}ms, policy={}, port={}",
        config.max_size,
        config.max_entries,
        config.default_ttl_ms,
        config.eviction_policy,
        config.server_port
    );

    let storage: Arc<dyn KvStorage> = Arc::new(
        FileStorage::open(&config.data_dir)
            .with_context(|| format!("opening data dir {}", config.data_dir.display()))?,
    );

    // Servers sharing a data dir exchange messages through its mirror slots,
    // read back every CACHE_MIRROR_POLL_INTERVAL_MS.
    let transport: Arc<dyn ClusterTransport> = if config.clustering_enabled {
        Arc::new(ClusterBus::new().mirrored_transport(storage.clone()))
    } else {
        Arc::new(NoopTransport)
    };

    let port = config.server_port;
    let cache = AdvancedCache::builder(config)
        .storage(storage)
        .transport(transport)
        .start();
    let state = AppState::new(cache);
    let cache = state.cache.clone();

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cache.destroy().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
