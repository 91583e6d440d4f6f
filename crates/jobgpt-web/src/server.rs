//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use jobgpt::background::BackgroundController;
use jobgpt::logging::LogBuffer;
use jobgpt::options::OptionsController;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::ws::{self, WsState};

/// Build the full axum router.
///
/// The router serves:
/// - WebSocket at `/ws?client_id=…`
/// - REST API at `/api/*`
/// - Optional static files for a packaged panel
pub fn build_router(
    background: Arc<BackgroundController>,
    logs: Option<LogBuffer>,
    static_dir: Option<PathBuf>,
    queue_capacity: usize,
) -> Router {
    let app_state = AppState {
        options: OptionsController::new(background.store().clone()),
        background: background.clone(),
        logs,
    };

    let ws_state = WsState {
        background,
        queue_capacity: queue_capacity.max(1),
    };

    // Panels are served from other origins during development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .with_state(ws_state);

    let api_routes = Router::new()
        .route("/api/command", post(api::post_command))
        .route("/api/requests/{client_id}", get(api::get_requests))
        .route("/api/state/{client_id}", get(api::get_state))
        .route("/api/options", get(api::get_options).post(api::post_options))
        .route("/api/logs", get(api::get_logs))
        .with_state(app_state);

    let mut router = Router::new().merge(ws_routes).merge(api_routes).layer(cors);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Bind `bind_addr`, serve `router` on a background task, and return the
/// bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("Listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server stopped: {e}");
        }
    });

    Ok(addr)
}
