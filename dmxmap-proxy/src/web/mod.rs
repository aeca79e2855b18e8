//! HTTP status endpoint.
//!
//! Read-only JSON views of the loaded configuration, the discovered Art-Net
//! nodes, and per-source throughput. Disabled entirely when `--api-listen`
//! is empty.

pub mod api;
pub mod state;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

pub use state::WebState;

/// Serve the status endpoint on an already-bound listener until shutdown.
/// Binding happens at startup so a bad `--api-listen` is fatal.
pub async fn serve(
    listener: TcpListener,
    state: Arc<WebState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = Router::new()
        .route("/", get(api::index))
        .route("/api/config", get(api::get_config))
        .route("/api/nodes", get(api::get_nodes))
        .route("/api/senders", get(api::get_senders))
        .route("/api/stats", get(api::get_stats))
        .with_state(state)
        .layer(CorsLayer::permissive());

    if let Ok(addr) = listener.local_addr() {
        log::info!("[api] listening addr=http://{addr}");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
