//! Error kinds shared by the research client, registry, and controllers.
//!
//! [`ResearchError`] is the typed error callers match on. [`ErrorCode`] is
//! its wire projection: the short code carried in command responses,
//! completion notifications, and persisted panel state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a research command or of the outbound API call.
///
/// `Aborted` is an expected outcome of a user cancelling a request. Callers
/// must not surface it as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResearchError {
    /// No credential was stored or supplied at submit time.
    #[error("missing API key")]
    MissingCredential,

    /// Cancel or acknowledge of an id the registry no longer holds.
    #[error("request {id} not found")]
    RequestNotFound { id: u64 },

    /// The provider reported an error, or the network call failed.
    #[error("{message}")]
    Api { message: String },

    /// The cancellation token fired before the call resolved.
    #[error("request aborted")]
    Aborted,
}

impl ResearchError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingCredential => ErrorCode::MissingApiKey,
            Self::RequestNotFound { .. } => ErrorCode::RequestNotFound,
            Self::Api { .. } | Self::Aborted => ErrorCode::Error,
        }
    }
}

/// Error code as it appears on the wire and in persisted state.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "ERROR_MISSING_API_KEY")]
    MissingApiKey,
    #[serde(rename = "ERROR_REQUEST_NOT_FOUND")]
    RequestNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_from_errors() {
        assert_eq!(
            ResearchError::MissingCredential.code(),
            ErrorCode::MissingApiKey
        );
        assert_eq!(
            ResearchError::RequestNotFound { id: 3 }.code(),
            ErrorCode::RequestNotFound
        );
        assert_eq!(ResearchError::api("boom").code(), ErrorCode::Error);
    }

    #[test]
    fn api_error_displays_provider_message() {
        let err = ResearchError::api("rate limited");
        assert_eq!(err.to_string(), "rate limited");
        assert!(!err.is_aborted());
        assert!(ResearchError::Aborted.is_aborted());
    }

    #[test]
    fn error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::MissingApiKey).unwrap();
        assert_eq!(json, r#""ERROR_MISSING_API_KEY""#);
        let code: ErrorCode = serde_json::from_str(r#""ERROR_REQUEST_NOT_FOUND""#).unwrap();
        assert_eq!(code, ErrorCode::RequestNotFound);
    }
}
