//! Company research assistant backed by an LLM with web search.
//!
//! `jobgpt` turns a company name into a markdown research report. A
//! [`Researcher`](api::Researcher) sends one cancellable request to an
//! OpenAI-style responses endpoint; a
//! [`BackgroundController`](background::BackgroundController) owns every
//! in-flight request and answers commands from panels; a
//! [`PanelController`](panel::PanelController) drives a per-client state
//! machine that survives restarts through the [`Store`](store::Store).
//!
//! # Getting started
//!
//! ```ignore
//! use jobgpt::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let researcher = Researcher::new(ResearchConfig::default()).map_err(|e| e.to_string())?;
//!     let store = Arc::new(Store::in_memory());
//!     let background = Arc::new(BackgroundController::new(researcher, store, 64));
//!
//!     let mut panel = PanelController::new(DEFAULT_CLIENT_ID, background.clone());
//!     let mut notifications = background.subscribe();
//!     panel.set_credential(std::env::var("OPENAI_API_KEY").ok());
//!     panel.activate("Acme Corp");
//!
//!     while let Ok(n) = notifications.recv().await {
//!         if panel.handle_notification(&n) {
//!             break;
//!         }
//!     }
//!     println!("{}", panel.state().content);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Request body, [`Transport`](api::Transport) seam, response parsing, [`Researcher`](api::Researcher) |
//! | [`prompt`] | System and user prompts for a company query |
//! | [`registry`] | In-flight request table with cancellation tokens |
//! | [`background`] | Command dispatch and completion notifications |
//! | [`panel`] | Panel state machine, controller, and rendering |
//! | [`store`] | Options and per-client state persistence |
//! | [`options`] | Credential management |
//! | [`logging`] | Tracing setup and in-memory log capture |

pub mod api;
pub mod background;
pub mod config;
pub mod error;
pub mod logging;
pub mod options;
pub mod panel;
pub mod prelude;
pub mod prompt;
pub mod registry;
pub mod store;

use serde::{Deserialize, Serialize};

pub use error::{ErrorCode, ResearchError};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the prompt.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One prompt message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_lowercase_role() {
        let json = serde_json::to_value(Message::system("be brief")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be brief");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
        assert_eq!(Message::assistant("ok").role, MessageRole::Assistant);
    }
}
