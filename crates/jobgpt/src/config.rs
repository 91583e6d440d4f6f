//! Research configuration with provider defaults.
//!
//! [`ResearchConfig`] captures the endpoint, model, and provider-specific
//! parameters sent with every research request. The CLI and web binaries
//! build one from flags; everything else takes it by reference.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default model provider endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/responses";

/// Default model for research requests.
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Client id used by the single-panel CLI.
pub const DEFAULT_CLIENT_ID: &str = "jobgpt-sidepanel";

/// Reasoning effort requested from the model.
#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Minimal,
    #[default]
    Low,
    Medium,
    High,
}

/// Output verbosity requested from the model.
#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Low,
    Medium,
    High,
}

/// How much search context the web-search tool may pull in.
#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchContextSize {
    #[default]
    Low,
    Medium,
    High,
}

/// Settings for the research client.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchConfig {
    /// Endpoint receiving the POST. Default: [`DEFAULT_ENDPOINT`].
    pub endpoint: String,
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// Default: `low`.
    pub reasoning_effort: Effort,
    /// Default: `low`.
    pub verbosity: Verbosity,
    /// Default: `low`.
    pub search_context_size: SearchContextSize,
    /// Output token cap. `None` leaves it to the provider.
    pub max_output_tokens: Option<u32>,
    /// Attach the provider's web-search tool. Default: `true`.
    pub web_search: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            reasoning_effort: Effort::default(),
            verbosity: Verbosity::default(),
            search_context_size: SearchContextSize::default(),
            max_output_tokens: None,
            web_search: true,
        }
    }
}

impl ResearchConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_reasoning_effort(mut self, effort: Effort) -> Self {
        self.reasoning_effort = effort;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_search_context_size(mut self, size: SearchContextSize) -> Self {
        self.search_context_size = size;
        self
    }

    pub fn with_max_output_tokens(mut self, max: Option<u32>) -> Self {
        self.max_output_tokens = max;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

/// Directory holding the options file and per-client state snapshots.
///
/// `$HOME/.config/jobgpt`, or `./.jobgpt` when `HOME` is unset.
pub fn default_data_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".config/jobgpt"),
        None => PathBuf::from(".jobgpt"),
    }
}
