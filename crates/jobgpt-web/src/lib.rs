//! HTTP and WebSocket surface for jobgpt panels.
//!
//! `jobgpt-web` exposes a [`BackgroundController`] over axum so a browser
//! panel (or `curl`) can send the same commands the CLI panel sends
//! in-process.
//!
//! # Quick start
//!
//! ```ignore
//! use jobgpt::prelude::*;
//! use jobgpt_web::{WebConfig, spawn_web};
//! use std::sync::Arc;
//!
//! let researcher = Researcher::new(ResearchConfig::default())?;
//! let store = Arc::new(Store::open(default_data_dir())?);
//! let background = Arc::new(BackgroundController::new(researcher, store, 256));
//!
//! let addr = spawn_web(background, None, WebConfig::default()).await?;
//! println!("Panel API: http://{addr}");
//! ```
//!
//! # Architecture
//!
//! ```text
//! BackgroundController ──Notification──▶ per-socket forwarder ──WsMessage──▶ client
//!          ▲                                                                   │
//!          └────────── Command (POST /api/command or WS text frame) ◀──────────┘
//! ```
//!
//! Every WebSocket connection is scoped to one client id: it receives that
//! client's state snapshot on connect and only that client's notifications.

mod api;
mod server;
pub mod ws;

pub use ws::{WsMessage, handle_client_message};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use jobgpt::background::BackgroundController;
use jobgpt::logging::LogBuffer;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Directory of a packaged panel to serve at `/`.
    ///
    /// If `None`, only API/WS endpoints are served.
    pub static_dir: Option<PathBuf>,
    /// Outbound queue depth per WebSocket client. Default: 256.
    pub broadcast_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            static_dir: None,
            broadcast_capacity: 256,
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// `logs`, when given, is served at `GET /api/logs`. The server runs until
/// the Tokio runtime shuts down.
pub async fn spawn_web(
    background: Arc<BackgroundController>,
    logs: Option<LogBuffer>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = server::build_router(
        background,
        logs,
        config.static_dir,
        config.broadcast_capacity,
    );
    server::start_server(router, config.bind_addr).await
}
