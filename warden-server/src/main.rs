//! `warden-server`: the WebSocket front end for the hierarchical
//! multi-lock coordination core.
//!
//! Wires [`warden_core::NamespaceRegistry`] behind an axum router, reads
//! configuration from the environment, and coordinates graceful shutdown
//! (signal- or TTL-triggered) with namespace draining.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;
use warden_core::NamespaceRegistry;

use warden_server::config::Config;
use warden_server::routes::AppState;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!(?config, "starting warden-server");

    let registry = Arc::new(NamespaceRegistry::new());
    let state = Arc::new(AppState {
        registry: Arc::clone(&registry),
    });

    if let Some(interval) = config.stats_interval {
        tokio::spawn(log_statistics_periodically(Arc::clone(&registry), interval));
    }

    let app = warden_server::app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr()));
    info!(addr = %config.bind_addr(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.ttl))
        .await
        .expect("server loop exited with an error");

    info!("draining namespaces before exit");
    registry.close_all().await;
    info!("shutdown complete");
}

/// Resolves on SIGINT, SIGTERM, or (if configured) TTL expiry — whichever
/// comes first.
async fn shutdown_signal(ttl: Option<Duration>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ttl_expired = async {
        match ttl {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
        _ = ttl_expired => info!("process TTL expired"),
    }
}

/// Background task: logs every namespace's statistics snapshot on a fixed
/// interval, until the process exits.
async fn log_statistics_periodically(registry: Arc<NamespaceRegistry>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for name in registry.list() {
            if let Some(locker) = registry.get(&name) {
                info!(namespace = %name, stats = ?locker.statistics(), "periodic statistics");
            }
        }
    }
}
