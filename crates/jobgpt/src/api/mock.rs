//! In-memory [`Transport`] for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{ResearchRequest, Transport, TransportFuture, parse_response};
use crate::error::ResearchError;

/// What the mock answers with.
#[derive(Clone, Debug)]
pub(crate) enum MockReply {
    /// An HTTP status and JSON body, run through the real parser.
    Json(u16, Value),
    /// A transport-level failure.
    Network(String),
    /// Never resolves; only cancellation ends the call.
    Hang,
}

impl MockReply {
    pub(crate) fn json(status: u16, body: Value) -> Self {
        Self::Json(status, body)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SentRequest {
    pub credential: String,
    pub body: ResearchRequest,
}

/// Records every call and answers with a fixed [`MockReply`].
#[derive(Clone)]
pub(crate) struct MockTransport {
    reply: MockReply,
    pub calls: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<SentRequest>>>,
    /// Set when an in-flight call future is dropped before resolving.
    pub dropped: Arc<AtomicBool>,
}

impl MockTransport {
    pub(crate) fn new(reply: MockReply) -> Self {
        Self {
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<SentRequest> {
        self.sent.lock().unwrap().last().cloned()
    }
}

/// Flags the owning call as dropped unless it resolved first.
struct DropFlag {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, credential: &str, body: &ResearchRequest) -> TransportFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentRequest {
            credential: credential.to_string(),
            body: body.clone(),
        });
        let reply = self.reply.clone();
        let mut guard = DropFlag {
            flag: self.dropped.clone(),
            armed: true,
        };
        Box::pin(async move {
            let result = match reply {
                MockReply::Json(status, body) => parse_response(status, &body.to_string()),
                MockReply::Network(message) => Err(ResearchError::api(message)),
                MockReply::Hang => futures::future::pending().await,
            };
            guard.armed = false;
            result
        })
    }
}
