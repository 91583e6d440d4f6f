//! In-flight research request bookkeeping.
//!
//! The [`RequestRegistry`] is the source of truth for "is something running
//! for this client". It is owned by the
//! [`BackgroundController`](crate::background::BackgroundController) and
//! mutated one command at a time: every method is a single critical
//! section, so when a completion acknowledgement and a cancel race on the
//! same id, whichever runs first wins and the other sees not-found.
//!
//! Lifecycle of an entry:
//!
//! ```text
//! create ──▶ (record_result | record_error) ──▶ complete      (delivered + acknowledged)
//!    └──────────────────────────────────────────▶ cancel        (user abort)
//! ```
//!
//! A recorded outcome stays in the table until it is acknowledged, so a
//! panel that missed the completion can pick it up when it reconnects.
//! One that is never acknowledged stays until the registry is cleared at
//! teardown.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ResearchResponse;
use crate::error::{ErrorCode, ResearchError};

/// One tracked research call.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: u64,
    pub client_id: String,
    /// Cancelling this token aborts the underlying call.
    pub cancel: CancellationToken,
    /// Set once the call resolved successfully, before acknowledgement.
    pub data: Option<ResearchResponse>,
    /// Set once the call failed, before acknowledgement.
    pub error: Option<RecordedError>,
}

/// Failure recorded against a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub code: ErrorCode,
    pub message: String,
}

impl Request {
    /// Whether the call resolved and is waiting for acknowledgement.
    pub fn is_resolved(&self) -> bool {
        self.data.is_some() || self.error.is_some()
    }

    /// Wire view of the request, as sent to clients.
    pub fn summary(&self) -> RequestSummary {
        RequestSummary { id: self.id }
    }
}

/// Serializable reference to a request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestSummary {
    pub id: u64,
}

/// Table of requests keyed by id, in insertion order.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: Vec<Request>,
    last_id: u64,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request for `client_id` with a fresh id and token.
    ///
    /// Ids start at 1 and strictly increase for the registry's lifetime,
    /// including across removals.
    pub fn create(&mut self, client_id: &str) -> Request {
        self.last_id += 1;
        let request = Request {
            id: self.last_id,
            client_id: client_id.to_string(),
            cancel: CancellationToken::new(),
            data: None,
            error: None,
        };
        self.requests.push(request.clone());
        debug!(
            "Registered request {} for client {client_id}",
            request.id
        );
        request
    }

    /// All requests belonging to `client_id`, oldest first.
    pub fn find_by_client(&self, client_id: &str) -> Vec<Request> {
        self.requests
            .iter()
            .filter(|r| r.client_id == client_id)
            .cloned()
            .collect()
    }

    pub fn find_by_id(&self, id: u64) -> Option<&Request> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Fire the request's token and remove it.
    pub fn cancel(&mut self, id: u64) -> Result<Request, ResearchError> {
        let request = self.remove(id).ok_or(ResearchError::RequestNotFound { id })?;
        request.cancel.cancel();
        debug!("Cancelled request {id}");
        Ok(request)
    }

    /// Cancel every request of `client_id`. Returns what was cancelled.
    pub fn cancel_client(&mut self, client_id: &str) -> Vec<Request> {
        let (cancelled, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.requests)
            .into_iter()
            .partition(|r| r.client_id == client_id);
        self.requests = kept;
        for request in &cancelled {
            request.cancel.cancel();
        }
        cancelled
    }

    /// Remove a request whose result was delivered and acknowledged.
    pub fn complete(&mut self, id: u64) -> Option<Request> {
        let removed = self.remove(id);
        if removed.is_some() {
            debug!("Completed request {id}");
        }
        removed
    }

    /// Attach a successful payload ahead of delivery.
    pub fn record_result(&mut self, id: u64, data: ResearchResponse) -> bool {
        match self.requests.iter_mut().find(|r| r.id == id) {
            Some(request) => {
                request.data = Some(data);
                true
            }
            None => false,
        }
    }

    /// Attach a failure ahead of delivery.
    pub fn record_error(&mut self, id: u64, code: ErrorCode, message: impl Into<String>) -> bool {
        match self.requests.iter_mut().find(|r| r.id == id) {
            Some(request) => {
                request.error = Some(RecordedError {
                    code,
                    message: message.into(),
                });
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Cancel and drop everything. Used at teardown.
    pub fn clear(&mut self) {
        for request in self.requests.drain(..) {
            request.cancel.cancel();
        }
    }

    fn remove(&mut self, id: u64) -> Option<Request> {
        let idx = self.requests.iter().position(|r| r.id == id)?;
        Some(self.requests.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_distinct_and_strictly_increasing() {
        let mut registry = RequestRegistry::new();
        let ids: Vec<u64> = (0..50)
            .map(|i| registry.create(if i % 2 == 0 { "a" } else { "b" }).id)
            .collect();
        assert_eq!(ids[0], 1);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(registry.len(), 50);
    }

    #[test]
    fn ids_keep_increasing_after_removal() {
        let mut registry = RequestRegistry::new();
        let first = registry.create("panel").id;
        registry.cancel(first).unwrap();
        let second = registry.create("panel").id;
        assert!(second > first);
    }

    #[test]
    fn find_by_client_returns_only_that_client_in_order() {
        let mut registry = RequestRegistry::new();
        let a1 = registry.create("a").id;
        let b1 = registry.create("b").id;
        let a2 = registry.create("a").id;

        let a: Vec<u64> = registry.find_by_client("a").iter().map(|r| r.id).collect();
        let b: Vec<u64> = registry.find_by_client("b").iter().map(|r| r.id).collect();
        assert_eq!(a, vec![a1, a2]);
        assert_eq!(b, vec![b1]);
        assert!(registry.find_by_client("c").is_empty());
    }

    #[test]
    fn cancel_succeeds_exactly_once() {
        let mut registry = RequestRegistry::new();
        let request = registry.create("panel");

        let cancelled = registry.cancel(request.id).unwrap();
        assert!(cancelled.cancel.is_cancelled());
        assert!(request.cancel.is_cancelled(), "token clones share state");
        assert!(registry.find_by_id(request.id).is_none());

        assert_eq!(
            registry.cancel(request.id).unwrap_err(),
            ResearchError::RequestNotFound { id: request.id }
        );
    }

    #[test]
    fn cancel_of_unknown_id_has_no_side_effects() {
        let mut registry = RequestRegistry::new();
        let request = registry.create("panel");
        assert!(registry.cancel(request.id + 1).is_err());
        assert_eq!(registry.len(), 1);
        assert!(!request.cancel.is_cancelled());
    }

    #[test]
    fn complete_then_cancel_loses() {
        let mut registry = RequestRegistry::new();
        let request = registry.create("panel");
        assert!(registry.complete(request.id).is_some());
        assert!(registry.cancel(request.id).is_err());
        assert!(!request.cancel.is_cancelled());
        assert!(registry.complete(request.id).is_none());
    }

    #[test]
    fn record_result_keeps_entry_until_complete() {
        let mut registry = RequestRegistry::new();
        let id = registry.create("panel").id;
        let data = ResearchResponse::from_payload(json!({"content": "# Acme"}));
        assert!(registry.record_result(id, data));
        assert_eq!(
            registry.find_by_id(id).unwrap().data.as_ref().unwrap().content,
            "# Acme"
        );
        assert!(registry.find_by_id(id).unwrap().is_resolved());
        assert!(registry.record_error(id, ErrorCode::Error, "rate limited"));
        assert_eq!(
            registry.find_by_id(id).unwrap().error.as_ref().unwrap().message,
            "rate limited"
        );
        registry.complete(id);
        assert!(!registry.record_result(
            id,
            ResearchResponse::from_payload(json!({}))
        ));
    }

    #[test]
    fn fresh_request_is_unresolved() {
        let mut registry = RequestRegistry::new();
        let request = registry.create("panel");
        assert!(!request.is_resolved());
        assert!(!registry.record_error(request.id + 1, ErrorCode::Error, "x"));
    }

    #[test]
    fn cancel_client_only_touches_that_client() {
        let mut registry = RequestRegistry::new();
        let a = registry.create("a");
        let b = registry.create("b");
        let cancelled = registry.cancel_client("a");
        assert_eq!(cancelled.len(), 1);
        assert!(a.cancel.is_cancelled());
        assert!(!b.cancel.is_cancelled());
        assert_eq!(registry.find_by_client("b").len(), 1);
        assert!(registry.cancel_client("a").is_empty());
    }

    #[test]
    fn clear_cancels_everything() {
        let mut registry = RequestRegistry::new();
        let a = registry.create("a");
        let b = registry.create("b");
        registry.clear();
        assert!(registry.is_empty());
        assert!(a.cancel.is_cancelled() && b.cancel.is_cancelled());
    }
}
