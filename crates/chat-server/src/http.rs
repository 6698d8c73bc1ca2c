//! HTTP side server: liveness endpoint and static client assets.

use axum::routing::get;
use axum::{Json, Router};
use chat_core::{ChatError, ChatResult};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    /// RFC 3339 server time.
    pub time: String,
}

/// Build the router: `/health` plus static files for every other path.
pub fn router(static_dir: PathBuf) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` fires. Returns the bound address.
pub async fn start(
    bind_addr: SocketAddr,
    static_dir: PathBuf,
    mut shutdown: broadcast::Receiver<()>,
) -> ChatResult<SocketAddr> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ChatError::Transport(format!("HTTP bind failed: {e}")))?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, static_dir = %static_dir.display(), "HTTP listener started");

    let app = router(static_dir);
    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP server failed");
        }
    });

    Ok(local_addr)
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        time: Utc::now().to_rfc3339(),
    })
}
