//! Provider reply parsing.
//!
//! Providers disagree on where the markdown lives. [`extract_content`]
//! accepts the Responses API shape (`output_text` or `output[].content[]`),
//! the chat-completions shape (`choices[0].message.content`), and a bare
//! `content` string, first match wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ResearchError;

/// Token usage reported by the provider.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Read a usage object, accepting both `input/output` and
    /// `prompt/completion` field names. A missing total is the sum of the
    /// two halves.
    pub fn from_json(usage: &Value) -> Option<Self> {
        let obj = usage.as_object()?;
        let field = |names: &[&str]| -> Option<u32> {
            names
                .iter()
                .find_map(|n| obj.get(*n).and_then(Value::as_u64))
                .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        };
        let input_tokens = field(&["input_tokens", "prompt_tokens"]).unwrap_or(0);
        let output_tokens = field(&["output_tokens", "completion_tokens"]).unwrap_or(0);
        let total_tokens =
            field(&["total_tokens"]).unwrap_or_else(|| input_tokens.saturating_add(output_tokens));
        Some(Self {
            input_tokens,
            output_tokens,
            total_tokens,
        })
    }

    /// Display label, e.g. `"42 tokens"`.
    pub fn label(&self) -> String {
        format!("{} tokens", self.total_tokens)
    }
}

/// A successful research reply.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResearchResponse {
    /// Markdown report.
    pub content: String,
    pub usage: Option<TokenUsage>,
    /// The provider payload as received.
    pub raw: Value,
}

impl ResearchResponse {
    /// Build a response from a decoded provider payload.
    pub fn from_payload(raw: Value) -> Self {
        let content = extract_content(&raw);
        let usage = raw.get("usage").and_then(TokenUsage::from_json);
        Self {
            content,
            usage,
            raw,
        }
    }
}

/// Parse a provider reply.
///
/// An `error.message` in the payload is an [`Api`](ResearchError::Api)
/// error regardless of status, so a 2xx carrying an error is still a
/// failure.
pub fn parse_response(status: u16, body: &str) -> Result<ResearchResponse, ResearchError> {
    let success = (200..300).contains(&status);
    let payload: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if success => {
            return Err(ResearchError::api(format!("failed to parse response: {e}")));
        }
        Err(_) => return Err(ResearchError::api(format!("HTTP {status}"))),
    };

    if let Some(message) = error_message(&payload) {
        debug!("Provider returned error (HTTP {status}): {message}");
        return Err(ResearchError::api(message));
    }
    if !success {
        return Err(ResearchError::api(format!("HTTP {status}")));
    }

    let response = ResearchResponse::from_payload(payload);
    if let Some(usage) = response.usage {
        debug!(
            "Token usage: input={}, output={}, total={}",
            usage.input_tokens, usage.output_tokens, usage.total_tokens
        );
    }
    Ok(response)
}

fn error_message(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        err => Some(
            err.get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string(),
        ),
    }
}

/// Pull the markdown report out of a provider payload. Empty when absent.
pub fn extract_content(payload: &Value) -> String {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(items) = payload.get("output").and_then(Value::as_array) {
        let parts: Vec<&str> = items
            .iter()
            .filter_map(|item| item.get("content").and_then(Value::as_array))
            .flatten()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if !parts.is_empty() {
            return parts.join("\n\n");
        }
    }

    if let Some(text) = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return text.to_string();
    }

    payload
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
