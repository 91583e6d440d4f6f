//! jobgpt panel server.
//!
//! Serves the command surface over REST and WebSocket so a browser panel
//! can research companies through a shared background controller.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p jobgpt-web
//! cargo run -p jobgpt-web -- --port 8080 --static-dir ./panel
//! RUST_LOG=debug cargo run -p jobgpt-web -- --model gpt-5-mini
//! ```
//!
//! ## Sending commands
//!
//! **WebSocket** (connect to `/ws?client_id=jobgpt-sidepanel`):
//! ```json
//! {"action": "research-company", "clientId": "jobgpt-sidepanel", "searchString": "Acme Corp"}
//! ```
//!
//! **REST** (`POST /api/command`): same body.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use jobgpt::prelude::*;
use jobgpt_web::{WebConfig, spawn_web};
use tracing::info;

/// jobgpt panel server.
#[derive(Parser)]
#[command(about = "HTTP and WebSocket server for jobgpt panels")]
struct Args {
    /// Port for the server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Directory for options and saved panel state.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Serve a packaged panel from this directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Model used for research requests.
    #[arg(long)]
    model: Option<String>,

    /// Provider endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Store this API key before starting.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Notification backlog per subscriber.
    #[arg(long, default_value_t = 256)]
    capacity: usize,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    let logs = jobgpt::logging::init(&args.log_level);

    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    let store = Arc::new(Store::open(&data_dir).map_err(|e| e.to_string())?);
    if let Some(key) = &args.api_key {
        OptionsController::new(store.clone())
            .save(key)
            .map_err(|e| e.to_string())?;
    }

    let mut config = ResearchConfig::default();
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(endpoint) = args.endpoint {
        config = config.with_endpoint(endpoint);
    }
    let researcher = Researcher::new(config).map_err(|e| e.to_string())?;
    let background = Arc::new(BackgroundController::new(researcher, store, args.capacity));

    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        static_dir: args.static_dir,
        broadcast_capacity: args.capacity,
    };
    let addr = spawn_web(background.clone(), Some(logs), web_config)
        .await
        .map_err(|e| format!("failed to start server: {e}"))?;
    println!("Panel API: http://{addr}");
    println!("Data dir: {}", data_dir.display());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for Ctrl-C: {e}"))?;
    info!("Shutting down");
    background.shutdown();
    Ok(())
}
