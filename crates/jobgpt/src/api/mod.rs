//! Outbound API layer: request body, transport seam, and the research client.
//!
//! - [`ResearchRequest`] is the JSON body POSTed to the model provider.
//! - [`Transport`] is the seam between the research client and the network.
//!   [`HttpTransport`] is the reqwest-backed implementation; tests inject
//!   their own.
//! - [`research`] races a transport call against a cancellation token.
//! - [`response`] turns a raw provider reply into a [`ResearchResponse`] or
//!   an [`Api`](crate::ResearchError::Api) error.

pub mod research;
pub mod response;

#[cfg(test)]
pub(crate) mod mock;

pub use research::{PendingResearch, Researcher};
pub use response::{ResearchResponse, TokenUsage, parse_response};

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, trace};

use crate::Message;
use crate::config::{Effort, ResearchConfig, SearchContextSize, Verbosity};
use crate::error::ResearchError;

// ── Request body ───────────────────────────────────────────────────

/// Research request body. Optional fields are omitted from serialization.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResearchRequest {
    pub model: String,
    pub input: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub reasoning: ReasoningConfig,
    pub text: TextConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Provider-side tool enabled for the request.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    WebSearch {
        search_context_size: SearchContextSize,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReasoningConfig {
    pub effort: Effort,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TextConfig {
    pub verbosity: Verbosity,
}

impl ResearchRequest {
    /// Assemble a request body from the configured provider parameters.
    pub fn from_config(config: &ResearchConfig, input: Vec<Message>) -> Self {
        let (tools, tool_choice) = if config.web_search {
            (
                vec![ToolSpec::WebSearch {
                    search_context_size: config.search_context_size,
                }],
                Some("auto".to_string()),
            )
        } else {
            (Vec::new(), None)
        };
        Self {
            model: config.model.clone(),
            input,
            tools,
            tool_choice,
            reasoning: ReasoningConfig {
                effort: config.reasoning_effort,
            },
            text: TextConfig {
                verbosity: config.verbosity,
            },
            max_output_tokens: config.max_output_tokens,
        }
    }
}

// ── Transport ──────────────────────────────────────────────────────

/// Boxed future returned by a [`Transport`]. Owns everything it needs so
/// it can be raced against a cancellation token on any task.
pub type TransportFuture =
    Pin<Box<dyn Future<Output = Result<ResearchResponse, ResearchError>> + Send + 'static>>;

/// One outbound call to the model provider.
///
/// Implementations must be lazy: no I/O happens until the returned future
/// is polled, and dropping the future abandons the call.
pub trait Transport: Send + Sync {
    fn send(&self, credential: &str, body: &ResearchRequest) -> TransportFuture;
}

/// reqwest-backed transport POSTing JSON with a bearer credential.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Build a transport for `endpoint`. No request timeout is set: a hung
    /// call stays pending until its token is cancelled.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ResearchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("jobgpt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResearchError::api(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn send(&self, credential: &str, body: &ResearchRequest) -> TransportFuture {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let authorization = format!("Bearer {credential}");
        let body = body.clone();

        Box::pin(async move {
            debug!(
                "Research request: model={}, messages={}, tools={}",
                body.model,
                body.input.len(),
                body.tools.len()
            );
            trace!(
                "Request payload size: {} bytes",
                serde_json::to_string(&body).map_or(0, |s| s.len())
            );

            let start = Instant::now();
            let resp = client
                .post(&endpoint)
                .header(AUTHORIZATION, authorization)
                .header(CONTENT_TYPE, "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| ResearchError::api(format!("request failed: {e}")))?;

            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| ResearchError::api(format!("failed to read response: {e}")))?;

            debug!(
                "Research response: HTTP {} in {:.1}s ({} bytes)",
                status,
                start.elapsed().as_secs_f64(),
                text.len()
            );

            parse_response(status.as_u16(), &text)
        })
    }
}
