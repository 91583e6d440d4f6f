//! Panel state machine.
//!
//! ```text
//! Idle ──submit──▶ Loading ──┬─ success ──▶ Success ─┐
//!   ▲                        ├─ api error ─▶ Error  ─┤
//!   │                        └─ cancel ────▶ Aborted ┤
//!   └──────────────── next submit ◀──────────────────┘
//! ```
//!
//! Transitions are the pure [`reduce`] function. The [`PanelController`]
//! decides which event applies (talking to the background controller) and
//! [`render`] turns a state into what the panel shows.

mod controller;
pub mod render;

pub use controller::PanelController;
pub use render::{PanelView, render};

use serde::{Deserialize, Serialize};

use crate::api::TokenUsage;
use crate::error::ErrorCode;

pub const MISSING_API_KEY_TEXT: &str = "Missing API key.";
pub const CANCELLED_TEXT: &str = "Cancelled.";
pub const REQUEST_NOT_FOUND_TEXT: &str = "Request not found.";

/// Panel lifecycle status.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
    Aborted,
}

/// Everything the panel needs to render, persisted per client id.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PanelState {
    pub search_string: String,
    pub status: Status,
    /// Markdown on success, plain message otherwise.
    pub content: String,
    pub tokens: Option<TokenUsage>,
    pub error: Option<ErrorCode>,
}

/// Inputs to the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum PanelEvent {
    /// The user edited the query.
    InputChanged(String),
    /// The background accepted a research command.
    Submitted { search_string: String },
    /// Submit was refused for lack of a credential.
    MissingCredential,
    /// The background cancelled the tracked request.
    AbortConfirmed,
    /// The request to cancel was no longer registered.
    AbortRejected,
    /// The research call resolved.
    Succeeded {
        content: String,
        usage: Option<TokenUsage>,
    },
    /// The research call, or the command starting it, failed.
    Failed { message: String },
    /// The research call was rejected with `Aborted`. The abort path has
    /// already moved the state, so this is a no-op.
    Aborted,
}

/// Apply `event` to `state`.
pub fn reduce(state: PanelState, event: PanelEvent) -> PanelState {
    match event {
        PanelEvent::InputChanged(text) => PanelState {
            search_string: text.trim().to_string(),
            ..state
        },
        PanelEvent::Submitted { search_string } => PanelState {
            search_string,
            status: Status::Loading,
            content: String::new(),
            tokens: None,
            error: None,
        },
        PanelEvent::MissingCredential => PanelState {
            status: Status::Error,
            content: MISSING_API_KEY_TEXT.to_string(),
            tokens: None,
            error: Some(ErrorCode::MissingApiKey),
            ..state
        },
        PanelEvent::AbortConfirmed => PanelState {
            status: Status::Aborted,
            content: CANCELLED_TEXT.to_string(),
            tokens: None,
            error: None,
            ..state
        },
        PanelEvent::AbortRejected => PanelState {
            status: Status::Error,
            content: REQUEST_NOT_FOUND_TEXT.to_string(),
            tokens: None,
            error: Some(ErrorCode::RequestNotFound),
            ..state
        },
        PanelEvent::Succeeded { content, usage } => PanelState {
            status: Status::Success,
            content,
            tokens: usage,
            error: None,
            ..state
        },
        PanelEvent::Failed { message } => PanelState {
            status: Status::Error,
            content: message,
            tokens: None,
            error: Some(ErrorCode::Error),
            ..state
        },
        PanelEvent::Aborted => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loading() -> PanelState {
        reduce(
            PanelState::default(),
            PanelEvent::Submitted {
                search_string: "Acme Corp".into(),
            },
        )
    }

    #[test]
    fn default_state_is_idle_and_empty() {
        let state = PanelState::default();
        assert_eq!(state.status, Status::Idle);
        assert!(state.content.is_empty());
        assert!(state.tokens.is_none() && state.error.is_none());
    }

    #[test]
    fn submit_moves_to_loading_and_clears_previous_result() {
        let failed = reduce(
            PanelState::default(),
            PanelEvent::Failed {
                message: "boom".into(),
            },
        );
        let state = reduce(
            failed,
            PanelEvent::Submitted {
                search_string: "Acme Corp".into(),
            },
        );
        assert_eq!(state.status, Status::Loading);
        assert_eq!(state.search_string, "Acme Corp");
        assert!(state.content.is_empty());
        assert!(state.error.is_none());
    }

    #[test]
    fn success_records_content_and_tokens() {
        let usage = TokenUsage {
            total_tokens: 42,
            ..Default::default()
        };
        let state = reduce(
            loading(),
            PanelEvent::Succeeded {
                content: "# Acme".into(),
                usage: Some(usage),
            },
        );
        assert_eq!(state.status, Status::Success);
        assert_eq!(state.content, "# Acme");
        assert_eq!(state.tokens, Some(usage));
        assert_eq!(state.search_string, "Acme Corp");
    }

    #[test]
    fn failure_sets_message_as_content() {
        let state = reduce(
            loading(),
            PanelEvent::Failed {
                message: "rate limited".into(),
            },
        );
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.content, "rate limited");
        assert_eq!(state.error, Some(ErrorCode::Error));
    }

    #[test]
    fn abort_outcomes() {
        let aborted = reduce(loading(), PanelEvent::AbortConfirmed);
        assert_eq!(aborted.status, Status::Aborted);
        assert_eq!(aborted.content, CANCELLED_TEXT);

        let missing = reduce(loading(), PanelEvent::AbortRejected);
        assert_eq!(missing.status, Status::Error);
        assert_eq!(missing.error, Some(ErrorCode::RequestNotFound));
    }

    #[test]
    fn aborted_completion_is_a_no_op() {
        let aborted = reduce(loading(), PanelEvent::AbortConfirmed);
        assert_eq!(reduce(aborted.clone(), PanelEvent::Aborted), aborted);
    }

    #[test]
    fn missing_credential_is_an_error_state() {
        let state = reduce(PanelState::default(), PanelEvent::MissingCredential);
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.error, Some(ErrorCode::MissingApiKey));
    }

    #[test]
    fn input_is_trimmed() {
        let state = reduce(
            PanelState::default(),
            PanelEvent::InputChanged("  Acme  ".into()),
        );
        assert_eq!(state.search_string, "Acme");
        assert_eq!(state.status, Status::Idle);
    }

    #[test]
    fn state_round_trips_through_json_with_missing_fields() {
        let state: PanelState = serde_json::from_str(r#"{"status":"SUCCESS"}"#).unwrap();
        assert_eq!(state.status, Status::Success);
        assert!(state.search_string.is_empty());
    }
}
