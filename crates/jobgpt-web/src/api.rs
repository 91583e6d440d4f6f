//! REST API endpoint handlers.
//!
//! Request/response access to the command surface. Notifications are only
//! pushed over the WebSocket; REST clients poll `/api/requests/{client_id}`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use jobgpt::background::{BackgroundController, Command, CommandResponse};
use jobgpt::logging::{LogBuffer, LogLine};
use jobgpt::options::OptionsController;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub background: Arc<BackgroundController>,
    pub options: OptionsController,
    pub logs: Option<LogBuffer>,
}

/// POST /api/command: Dispatch any command.
///
/// Rejections are part of the protocol and come back as 200 with an
/// `error` field.
pub async fn post_command(
    State(app): State<AppState>,
    Json(command): Json<Command>,
) -> Json<CommandResponse> {
    Json(app.background.handle(command))
}

/// GET /api/requests/{client_id}: The client's in-flight request ids.
pub async fn get_requests(
    State(app): State<AppState>,
    Path(client_id): Path<String>,
) -> Json<CommandResponse> {
    Json(app.background.handle(Command::GetRequests { client_id }))
}

/// GET /api/state/{client_id}: The client's persisted panel state.
pub async fn get_state(
    State(app): State<AppState>,
    Path(client_id): Path<String>,
) -> Json<CommandResponse> {
    Json(app.background.handle(Command::GetState { client_id }))
}

/// Options as exposed over HTTP. The key itself is never returned.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptionsStatus {
    pub has_api_key: bool,
}

/// Request body for POST /api/options.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsRequest {
    #[serde(default)]
    pub api_key: String,
}

/// GET /api/options: Whether a credential is stored.
pub async fn get_options(
    State(app): State<AppState>,
) -> Result<Json<OptionsStatus>, StatusCode> {
    let has_api_key = app.options.has_key().map_err(|e| {
        warn!("Failed to read options: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(OptionsStatus { has_api_key }))
}

/// POST /api/options: Store (or clear, when blank) the credential.
pub async fn post_options(
    State(app): State<AppState>,
    Json(body): Json<OptionsRequest>,
) -> Result<Json<OptionsStatus>, StatusCode> {
    let saved = app.options.save(&body.api_key).map_err(|e| {
        warn!("Failed to save options: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(OptionsStatus {
        has_api_key: saved.openai_api_key.is_some(),
    }))
}

/// GET /api/logs: Recently captured log lines, oldest first.
pub async fn get_logs(State(app): State<AppState>) -> Json<Vec<LogLine>> {
    Json(app.logs.as_ref().map(LogBuffer::snapshot).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_request_deserializes() {
        let req: OptionsRequest = serde_json::from_str(r#"{"apiKey":"sk-test"}"#).unwrap();
        assert_eq!(req.api_key, "sk-test");
        let req: OptionsRequest = serde_json::from_str("{}").unwrap();
        assert!(req.api_key.is_empty());
    }

    #[test]
    fn options_status_serializes_camel_case() {
        let json = serde_json::to_value(OptionsStatus { has_api_key: true }).unwrap();
        assert_eq!(json["hasApiKey"], true);
    }
}
