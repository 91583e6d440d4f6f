//! Command-line company research.
//!
//! Runs a single panel against an in-process background controller and
//! prints the resulting report. The API key comes from `--api-key`,
//! `OPENAI_API_KEY`, or the key stored with `jobgpt set-key`.
//!
//! # Examples
//!
//! ```sh
//! jobgpt set-key sk-...
//! jobgpt research Acme Corp
//! jobgpt research --model gpt-5-mini --effort medium "Globex Corporation"
//! jobgpt state
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jobgpt::config::{Effort, SearchContextSize, Verbosity};
use jobgpt::panel::render::{ADD_API_KEY_TEXT, markdown_to_html};
use jobgpt::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

#[derive(Parser)]
#[command(name = "jobgpt", version, about = "Research a company before you apply")]
struct Cli {
    /// Directory for options and saved panel state.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Research a company and print the report.
    Research(ResearchArgs),
    /// Store the OpenAI API key. An empty key clears it.
    SetKey { key: String },
    /// Print the saved panel state.
    State {
        #[arg(long, default_value = DEFAULT_CLIENT_ID)]
        client_id: String,
    },
}

#[derive(clap::Args)]
struct ResearchArgs {
    /// Company name.
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,

    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    client_id: String,

    /// API key; overrides the stored key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long, value_enum)]
    effort: Option<Effort>,

    #[arg(long, value_enum)]
    verbosity: Option<Verbosity>,

    #[arg(long, value_enum)]
    search_context_size: Option<SearchContextSize>,

    #[arg(long)]
    max_output_tokens: Option<u32>,

    /// Do not attach the web-search tool.
    #[arg(long)]
    no_web_search: bool,

    /// Print HTML instead of markdown.
    #[arg(long)]
    html: bool,
}

impl ResearchArgs {
    fn config(&self) -> ResearchConfig {
        let mut config = ResearchConfig::default()
            .with_max_output_tokens(self.max_output_tokens)
            .with_web_search(!self.no_web_search);
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        if let Some(effort) = self.effort {
            config = config.with_reasoning_effort(effort);
        }
        if let Some(verbosity) = self.verbosity {
            config = config.with_verbosity(verbosity);
        }
        if let Some(size) = self.search_context_size {
            config = config.with_search_context_size(size);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    jobgpt::logging::init(&cli.log_level);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let store = Arc::new(Store::open(&data_dir).map_err(|e| e.to_string())?);

    match cli.command {
        CliCommand::Research(args) => research(args, store).await,
        CliCommand::SetKey { key } => {
            let saved = OptionsController::new(store)
                .save(&key)
                .map_err(|e| e.to_string())?;
            match saved.openai_api_key {
                Some(_) => println!("API key saved to {}", data_dir.display()),
                None => println!("API key cleared"),
            }
            Ok(())
        }
        CliCommand::State { client_id } => {
            match store.load_snapshot(&client_id).map_err(|e| e.to_string())? {
                Some(snapshot) => {
                    let json =
                        serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
                    println!("{json}");
                }
                None => println!("No saved state for {client_id}"),
            }
            Ok(())
        }
    }
}

async fn research(args: ResearchArgs, store: Arc<Store>) -> Result<(), String> {
    let query = args.query.join(" ");
    let researcher = Researcher::new(args.config()).map_err(|e| e.to_string())?;
    let background = Arc::new(BackgroundController::new(researcher, store, 16));
    let mut notifications = background.subscribe();

    let mut panel = PanelController::new(args.client_id.as_str(), background.clone());
    panel.set_credential(args.api_key.clone());
    panel.input(&query);
    panel.activate(&query);

    if panel.state().status == Status::Loading {
        eprintln!("Researching {query}...");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    panel.activate(&query);
                    break;
                }
                received = notifications.recv() => match received {
                    Ok(notification) => {
                        if panel.handle_notification(&notification) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => warn!("Missed {n} notification(s)"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    let outcome = report(panel.state(), args.html);
    background.shutdown();
    outcome
}

fn report(state: &PanelState, html: bool) -> Result<(), String> {
    match state.status {
        Status::Success => {
            if html {
                println!("{}", markdown_to_html(&state.content));
            } else {
                println!("{}", state.content);
            }
            println!("\n--- {} ---", state.tokens.unwrap_or_default().label());
            Ok(())
        }
        Status::Aborted => {
            eprintln!("{}", state.content);
            Ok(())
        }
        Status::Error if state.error == Some(ErrorCode::MissingApiKey) => Err(format!(
            "{ADD_API_KEY_TEXT} Run `jobgpt set-key <key>` or set OPENAI_API_KEY."
        )),
        Status::Error => Err(state.content.clone()),
        Status::Idle | Status::Loading => Ok(()),
    }
}
