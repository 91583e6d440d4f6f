//! Background controller: the command surface every panel talks to.
//!
//! The controller owns the [`RequestRegistry`], the [`Researcher`], and a
//! broadcast channel of [`Notification`]s. Panels send [`Command`]s and get
//! a [`CommandResponse`] back immediately; long-running research completes
//! on a spawned tokio task which records the outcome in the registry and
//! broadcasts `research-company-done`.
//!
//! The controller also folds every lifecycle event it sees (submit,
//! completion, abort) into the client's stored [`PanelState`], so a panel
//! that only talks over the wire still finds its state persisted. Outcomes
//! stay in the registry until acknowledged; [`BackgroundController::undelivered`]
//! replays them for a panel that reconnects.
//!
//! # Wire format
//!
//! Commands and notifications are JSON objects tagged by `action`:
//!
//! ```json
//! {"action": "research-company", "clientId": "jobgpt-sidepanel", "searchString": "Acme Corp"}
//! {"action": "research-company-done", "clientId": "jobgpt-sidepanel", "requestId": 1, "data": {...}}
//! ```
//!
//! Responses are untagged; their shape tells them apart.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ResearchResponse, Researcher};
use crate::error::{ErrorCode, ResearchError};
use crate::panel::{
    CANCELLED_TEXT, MISSING_API_KEY_TEXT, PanelEvent, PanelState, REQUEST_NOT_FOUND_TEXT, Status,
    reduce,
};
use crate::registry::{Request, RequestRegistry, RequestSummary};
use crate::store::Store;

pub const EMPTY_SEARCH_TEXT: &str = "Empty search string.";

// ── Commands ───────────────────────────────────────────────────────

/// A command sent by a panel.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(
    tag = "action",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    /// List the client's in-flight requests.
    GetRequests { client_id: String },
    /// Fetch the client's persisted panel state.
    GetState { client_id: String },
    /// Replace the client's persisted panel state.
    SaveState { client_id: String, state: PanelState },
    /// Start researching `search_string`. Without `api_key` the stored
    /// credential is used.
    ResearchCompany {
        client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        search_string: String,
    },
    /// Cancel one request.
    RequestAbort { client_id: String, request_id: u64 },
    /// Cancel every request of the client.
    ResearchCompanyAbort { client_id: String },
    /// The client consumed a `research-company-done` notification.
    ResearchCompanyAck { client_id: String, request_id: u64 },
}

impl Command {
    pub fn client_id(&self) -> &str {
        match self {
            Self::GetRequests { client_id }
            | Self::GetState { client_id }
            | Self::SaveState { client_id, .. }
            | Self::ResearchCompany { client_id, .. }
            | Self::RequestAbort { client_id, .. }
            | Self::ResearchCompanyAbort { client_id }
            | Self::ResearchCompanyAck { client_id, .. } => client_id,
        }
    }

    /// Wire name of the command.
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetRequests { .. } => "get-requests",
            Self::GetState { .. } => "get-state",
            Self::SaveState { .. } => "save-state",
            Self::ResearchCompany { .. } => "research-company",
            Self::RequestAbort { .. } => "request-abort",
            Self::ResearchCompanyAbort { .. } => "research-company-abort",
            Self::ResearchCompanyAck { .. } => "research-company-ack",
        }
    }
}

/// Reply to a [`Command`].
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum CommandResponse {
    Requests {
        client_id: String,
        requests: Vec<RequestSummary>,
    },
    State {
        client_id: String,
        state: PanelState,
    },
    Accepted {
        client_id: String,
        request: RequestSummary,
    },
    Cancelled {
        client_id: String,
        request_id: u64,
        data: String,
    },
    Acknowledged {
        client_id: String,
        request_id: u64,
    },
    Rejected {
        client_id: String,
        request_id: Option<u64>,
        error: ErrorCode,
        data: String,
    },
}

impl CommandResponse {
    fn rejected(client_id: &str, error: ErrorCode, data: &str) -> Self {
        Self::Rejected {
            client_id: client_id.to_string(),
            request_id: None,
            error,
            data: data.to_string(),
        }
    }

    fn not_found(client_id: &str) -> Self {
        Self::rejected(client_id, ErrorCode::RequestNotFound, REQUEST_NOT_FOUND_TEXT)
    }

    /// The error code, if the command was rejected.
    pub fn error(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { error, .. } => Some(*error),
            _ => None,
        }
    }
}

// ── Notifications ──────────────────────────────────────────────────

/// Payload of a `research-company-done` notification: the reply on
/// success, the error message text on failure.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum DoneData {
    Response(ResearchResponse),
    Message(String),
}

/// Broadcast to every connected panel. Panels filter on `client_id`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(
    tag = "action",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Notification {
    ResearchCompanyStarted {
        client_id: String,
        request_id: u64,
        search_string: String,
    },
    ResearchCompanyDone {
        client_id: String,
        request_id: u64,
        data: DoneData,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorCode>,
    },
}

/// A `research-company-done` notification split by outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome<'a> {
    Success(&'a ResearchResponse),
    Error { code: ErrorCode, message: &'a str },
}

impl Outcome<'_> {
    /// `research-company-success` or `research-company-error`.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Success(_) => "research-company-success",
            Self::Error { .. } => "research-company-error",
        }
    }

    /// The panel transition this outcome causes.
    pub fn event(&self) -> PanelEvent {
        match self {
            Self::Success(resp) => PanelEvent::Succeeded {
                content: resp.content.clone(),
                usage: resp.usage,
            },
            Self::Error { message, .. } => PanelEvent::Failed {
                message: message.to_string(),
            },
        }
    }
}

impl Notification {
    pub fn client_id(&self) -> &str {
        match self {
            Self::ResearchCompanyStarted { client_id, .. }
            | Self::ResearchCompanyDone { client_id, .. } => client_id,
        }
    }

    pub fn request_id(&self) -> u64 {
        match self {
            Self::ResearchCompanyStarted { request_id, .. }
            | Self::ResearchCompanyDone { request_id, .. } => *request_id,
        }
    }

    /// The `research-company-done` for a resolved request, `None` while the
    /// call is still running.
    pub fn done(request: &Request) -> Option<Self> {
        let (data, error) = match (&request.data, &request.error) {
            (_, Some(failure)) => (DoneData::Message(failure.message.clone()), Some(failure.code)),
            (Some(resp), None) => (DoneData::Response(resp.clone()), None),
            (None, None) => return None,
        };
        Some(Self::ResearchCompanyDone {
            client_id: request.client_id.clone(),
            request_id: request.id,
            data,
            error,
        })
    }

    /// Outcome of a completion, `None` for `research-company-started`.
    pub fn outcome(&self) -> Option<Outcome<'_>> {
        match self {
            Self::ResearchCompanyStarted { .. } => None,
            Self::ResearchCompanyDone {
                data: DoneData::Response(resp),
                error: None,
                ..
            } => Some(Outcome::Success(resp)),
            Self::ResearchCompanyDone { data, error, .. } => Some(Outcome::Error {
                code: error.unwrap_or(ErrorCode::Error),
                message: match data {
                    DoneData::Message(message) => message,
                    DoneData::Response(resp) => &resp.content,
                },
            }),
        }
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Owns in-flight research requests and answers panel commands.
pub struct BackgroundController {
    researcher: Researcher,
    registry: Arc<Mutex<RequestRegistry>>,
    store: Arc<Store>,
    notifier: broadcast::Sender<Notification>,
}

impl BackgroundController {
    /// `capacity` bounds the notification backlog per subscriber.
    pub fn new(researcher: Researcher, store: Arc<Store>, capacity: usize) -> Self {
        let (notifier, _) = broadcast::channel(capacity.max(1));
        info!("Initializing BackgroundController");
        Self {
            researcher,
            registry: Arc::new(Mutex::new(RequestRegistry::new())),
            store,
            notifier,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn researcher(&self) -> &Researcher {
        &self.researcher
    }

    /// Ids of the client's registered requests, oldest first.
    pub fn requests_for(&self, client_id: &str) -> Vec<RequestSummary> {
        self.registry()
            .find_by_client(client_id)
            .iter()
            .map(|r| r.summary())
            .collect()
    }

    /// Completions recorded for `client_id` but not yet acknowledged,
    /// oldest first.
    pub fn undelivered(&self, client_id: &str) -> Vec<Notification> {
        self.registry()
            .find_by_client(client_id)
            .iter()
            .filter_map(Notification::done)
            .collect()
    }

    /// Cancel every request. Called at teardown.
    pub fn shutdown(&self) {
        let mut registry = self.registry();
        if !registry.is_empty() {
            info!("Cancelling {} in-flight request(s)", registry.len());
        }
        registry.clear();
    }

    /// Dispatch one command.
    ///
    /// Must be called from within a tokio runtime: `research-company`
    /// spawns the research task.
    pub fn handle(&self, command: Command) -> CommandResponse {
        info!(
            "Received {} command for client {}",
            command.action(),
            command.client_id()
        );
        match command {
            Command::GetRequests { client_id } => CommandResponse::Requests {
                requests: self.requests_for(&client_id),
                client_id,
            },
            Command::GetState { client_id } => {
                let state = self.store.load_state(&client_id).unwrap_or_else(|e| {
                    warn!("Failed to load state for {client_id}: {e}");
                    None
                });
                CommandResponse::State {
                    state: state.unwrap_or_default(),
                    client_id,
                }
            }
            Command::SaveState { client_id, state } => {
                let _registry = self.registry();
                match self.store.save_state(&client_id, &state) {
                    Ok(snapshot) => CommandResponse::State {
                        client_id,
                        state: snapshot.state,
                    },
                    Err(e) => {
                        warn!("Failed to save state for {client_id}: {e}");
                        CommandResponse::rejected(&client_id, ErrorCode::Error, &e.to_string())
                    }
                }
            }
            Command::ResearchCompany {
                client_id,
                api_key,
                search_string,
            } => self.research_company(&client_id, api_key, &search_string),
            Command::RequestAbort {
                client_id,
                request_id,
            } => {
                let mut registry = self.registry();
                match registry.cancel(request_id) {
                    Ok(request) => {
                        persist_event(&self.store, &client_id, PanelEvent::AbortConfirmed);
                        CommandResponse::Cancelled {
                            client_id,
                            request_id: request.id,
                            data: CANCELLED_TEXT.to_string(),
                        }
                    }
                    Err(e) => {
                        warn!("Abort failed: {e}");
                        persist_event(&self.store, &client_id, PanelEvent::AbortRejected);
                        CommandResponse::not_found(&client_id)
                    }
                }
            }
            Command::ResearchCompanyAbort { client_id } => {
                let mut registry = self.registry();
                let cancelled = registry.cancel_client(&client_id);
                match cancelled.first() {
                    Some(first) => {
                        persist_event(&self.store, &client_id, PanelEvent::AbortConfirmed);
                        CommandResponse::Cancelled {
                            request_id: first.id,
                            client_id,
                            data: CANCELLED_TEXT.to_string(),
                        }
                    }
                    None => {
                        warn!("No request found for client {client_id}");
                        persist_event(&self.store, &client_id, PanelEvent::AbortRejected);
                        CommandResponse::not_found(&client_id)
                    }
                }
            }
            Command::ResearchCompanyAck {
                client_id,
                request_id,
            } => match self.registry().complete(request_id) {
                Some(_) => CommandResponse::Acknowledged {
                    client_id,
                    request_id,
                },
                None => {
                    warn!("Ack for unknown request {request_id}");
                    CommandResponse::not_found(&client_id)
                }
            },
        }
    }

    fn research_company(
        &self,
        client_id: &str,
        api_key: Option<String>,
        search_string: &str,
    ) -> CommandResponse {
        let credential = match self.credential(api_key) {
            Some(key) => key,
            None => {
                warn!("No API key set");
                persist_event(&self.store, client_id, PanelEvent::MissingCredential);
                return CommandResponse::rejected(
                    client_id,
                    ResearchError::MissingCredential.code(),
                    MISSING_API_KEY_TEXT,
                );
            }
        };
        let search_string = search_string.trim();
        if search_string.is_empty() {
            warn!("Empty search string from client {client_id}");
            return CommandResponse::rejected(client_id, ErrorCode::Error, EMPTY_SEARCH_TEXT);
        }

        let mut registry = self.registry();
        let request = registry.create(client_id);
        persist_event(
            &self.store,
            client_id,
            PanelEvent::Submitted {
                search_string: search_string.to_string(),
            },
        );
        drop(registry);
        let pending = self.researcher.research_company_with(
            &credential,
            search_string,
            request.cancel.clone(),
        );

        // Started goes out before the task exists so it always precedes Done.
        let _ = self.notifier.send(Notification::ResearchCompanyStarted {
            client_id: client_id.to_string(),
            request_id: request.id,
            search_string: search_string.to_string(),
        });

        let registry = self.registry.clone();
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let id = request.id;
        let owner = client_id.to_string();
        tokio::spawn(async move {
            let result = pending.await;
            let mut table = registry.lock().unwrap_or_else(|e| e.into_inner());
            let recorded = match result {
                Ok(resp) => table.record_result(id, resp),
                Err(e) if e.is_aborted() => {
                    warn!("Request {id} was aborted by the user");
                    return;
                }
                Err(e) => table.record_error(id, e.code(), e.to_string()),
            };
            let done = table.find_by_id(id).and_then(Notification::done);
            let (true, Some(done)) = (recorded, done) else {
                debug!("Request {id} resolved after removal; dropping outcome");
                return;
            };
            if let Some(outcome) = done.outcome() {
                match outcome {
                    Outcome::Success(_) => info!("Sending research data to client {owner}"),
                    Outcome::Error { message, .. } => {
                        warn!("Sending error info to client {owner}: {message}")
                    }
                }
                persist_event(&store, &owner, outcome.event());
            }
            drop(table);
            let _ = notifier.send(done);
        });

        CommandResponse::Accepted {
            client_id: client_id.to_string(),
            request: request.summary(),
        }
    }

    /// Supplied key if non-blank, else the stored one.
    fn credential(&self, supplied: Option<String>) -> Option<String> {
        let supplied = supplied
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if supplied.is_some() {
            return supplied;
        }
        self.store.api_key().unwrap_or_else(|e| {
            warn!("Failed to read stored API key: {e}");
            None
        })
    }

    fn registry(&self) -> MutexGuard<'_, RequestRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fold `event` into the client's stored panel state.
fn persist_event(store: &Store, client_id: &str, event: PanelEvent) {
    let result = store.load_state(client_id).and_then(|state| {
        let state = state.unwrap_or_default();
        // A late abort must not overwrite a finished result.
        if event == PanelEvent::AbortRejected && state.status != Status::Loading {
            return Ok(());
        }
        store.save_state(client_id, &reduce(state, event)).map(drop)
    });
    if let Err(e) = result {
        warn!("Failed to persist state for {client_id}: {e}");
    }
}

impl Drop for BackgroundController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockReply, MockTransport};
    use crate::config::ResearchConfig;
    use serde_json::json;
    use std::time::Duration;

    fn controller(transport: &MockTransport) -> BackgroundController {
        let researcher =
            Researcher::with_transport(ResearchConfig::default(), Arc::new(transport.clone()));
        BackgroundController::new(researcher, Arc::new(Store::in_memory()), 16)
    }

    fn research(key: Option<&str>, query: &str) -> Command {
        Command::ResearchCompany {
            client_id: "panel".into(),
            api_key: key.map(str::to_string),
            search_string: query.into(),
        }
    }

    async fn next_done(rx: &mut broadcast::Receiver<Notification>) -> Notification {
        loop {
            let n = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(n, Notification::ResearchCompanyDone { .. }) {
                return n;
            }
        }
    }

    #[test]
    fn commands_parse_from_wire_json() {
        let cmd: Command = serde_json::from_value(json!({
            "action": "research-company",
            "clientId": "jobgpt-sidepanel",
            "apiKey": "sk-test",
            "searchString": "Acme Corp",
        }))
        .unwrap();
        assert_eq!(cmd.action(), "research-company");
        assert_eq!(cmd.client_id(), "jobgpt-sidepanel");

        let cmd: Command = serde_json::from_value(json!({
            "action": "request-abort", "clientId": "p", "requestId": 3
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::RequestAbort {
                client_id: "p".into(),
                request_id: 3
            }
        );
    }

    #[tokio::test]
    async fn missing_key_is_rejected_without_a_request() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);

        let resp = bg.handle(research(None, "Acme Corp"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"], "ERROR_MISSING_API_KEY");
        assert_eq!(json["data"], "Missing API key.");

        assert_eq!(bg.handle(research(Some("   "), "Acme")).error(), Some(ErrorCode::MissingApiKey));
        assert!(bg.requests_for("panel").is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_query_is_rejected_without_a_request() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        assert_eq!(bg.handle(research(Some("sk"), "  ")).error(), Some(ErrorCode::Error));
        assert!(bg.requests_for("panel").is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn research_broadcasts_started_then_done_and_ack_completes() {
        let transport = MockTransport::new(MockReply::json(
            200,
            json!({"content": "# Acme", "usage": {"total_tokens": 42}}),
        ));
        let bg = controller(&transport);
        let mut rx = bg.subscribe();

        let resp = bg.handle(research(Some("sk-test"), "Acme Corp"));
        let CommandResponse::Accepted { request, .. } = resp else {
            panic!("expected accepted, got {resp:?}");
        };
        assert_eq!(request.id, 1);

        let started = rx.recv().await.unwrap();
        assert!(matches!(
            started,
            Notification::ResearchCompanyStarted { request_id: 1, .. }
        ));

        let done = next_done(&mut rx).await;
        let Some(Outcome::Success(data)) = done.outcome() else {
            panic!("expected success, got {done:?}");
        };
        assert_eq!(data.content, "# Acme");
        assert_eq!(done.outcome().unwrap().action(), "research-company-success");

        // Result stays registered until acknowledged.
        assert_eq!(bg.requests_for("panel").len(), 1);
        let ack = bg.handle(Command::ResearchCompanyAck {
            client_id: "panel".into(),
            request_id: 1,
        });
        assert!(matches!(ack, CommandResponse::Acknowledged { request_id: 1, .. }));
        assert!(bg.requests_for("panel").is_empty());
    }

    #[tokio::test]
    async fn stored_key_is_used_when_none_supplied() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        bg.store()
            .save_options(&crate::store::Options {
                openai_api_key: Some("sk-stored".into()),
            })
            .unwrap();
        assert!(matches!(
            bg.handle(research(None, "Acme")),
            CommandResponse::Accepted { .. }
        ));
        assert_eq!(transport.last_request().unwrap().credential, "sk-stored");
    }

    #[tokio::test]
    async fn provider_error_is_delivered_with_error_code() {
        let transport = MockTransport::new(MockReply::json(
            200,
            json!({"error": {"message": "rate limited"}}),
        ));
        let bg = controller(&transport);
        let mut rx = bg.subscribe();
        bg.handle(research(Some("sk"), "Acme"));

        let done = next_done(&mut rx).await;
        assert_eq!(
            done.outcome(),
            Some(Outcome::Error {
                code: ErrorCode::Error,
                message: "rate limited"
            })
        );
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["action"], "research-company-done");
        assert_eq!(json["data"], "rate limited");
        assert_eq!(json["error"], "ERROR");
    }

    #[tokio::test]
    async fn abort_cancels_once_and_suppresses_done() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        let mut rx = bg.subscribe();
        bg.handle(research(Some("sk"), "Acme"));

        let abort = || Command::RequestAbort {
            client_id: "panel".into(),
            request_id: 1,
        };
        let resp = serde_json::to_value(bg.handle(abort())).unwrap();
        assert_eq!(resp["requestId"], 1);
        assert_eq!(resp["data"], "Cancelled.");

        let resp = serde_json::to_value(bg.handle(abort())).unwrap();
        assert_eq!(resp["requestId"], serde_json::Value::Null);
        assert_eq!(resp["error"], "ERROR_REQUEST_NOT_FOUND");
        assert_eq!(resp["data"], "Request not found.");

        assert!(matches!(
            rx.recv().await.unwrap(),
            Notification::ResearchCompanyStarted { .. }
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "aborted request must not notify");
        assert!(transport.dropped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn client_abort_cancels_all_of_its_requests() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        bg.handle(research(Some("sk"), "Acme"));
        bg.handle(research(Some("sk"), "Globex"));

        let resp = bg.handle(Command::ResearchCompanyAbort {
            client_id: "panel".into(),
        });
        assert!(matches!(resp, CommandResponse::Cancelled { request_id: 1, .. }));
        assert!(bg.requests_for("panel").is_empty());

        let resp = bg.handle(Command::ResearchCompanyAbort {
            client_id: "panel".into(),
        });
        assert_eq!(resp.error(), Some(ErrorCode::RequestNotFound));
    }

    #[tokio::test]
    async fn get_state_defaults_when_nothing_persisted() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        let resp = bg.handle(Command::GetState {
            client_id: "panel".into(),
        });
        assert_eq!(
            resp,
            CommandResponse::State {
                client_id: "panel".into(),
                state: PanelState::default()
            }
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["clientId"], "panel");
        assert_eq!(json["state"]["status"], "IDLE");
    }

    #[tokio::test]
    async fn lifecycle_is_folded_into_stored_state() {
        let transport = MockTransport::new(MockReply::json(
            200,
            json!({"content": "# Acme", "usage": {"total_tokens": 42}}),
        ));
        let bg = controller(&transport);
        let mut rx = bg.subscribe();

        bg.handle(research(Some("sk"), "  Acme Corp "));
        let stored = bg.store().load_state("panel").unwrap().unwrap();
        assert_eq!(stored.status, Status::Loading);
        assert_eq!(stored.search_string, "Acme Corp");

        next_done(&mut rx).await;
        let stored = bg.store().load_state("panel").unwrap().unwrap();
        assert_eq!(stored.status, Status::Success);
        assert_eq!(stored.content, "# Acme");
        assert_eq!(stored.tokens.unwrap().total_tokens, 42);
    }

    #[tokio::test]
    async fn abort_and_missing_key_are_stored() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);

        bg.handle(research(None, "Acme"));
        let stored = bg.store().load_state("panel").unwrap().unwrap();
        assert_eq!(stored.error, Some(ErrorCode::MissingApiKey));

        bg.handle(research(Some("sk"), "Acme"));
        bg.handle(Command::ResearchCompanyAbort {
            client_id: "panel".into(),
        });
        let stored = bg.store().load_state("panel").unwrap().unwrap();
        assert_eq!(stored.status, Status::Aborted);
        assert_eq!(stored.content, CANCELLED_TEXT);

        // Nothing is loading any more, so a stale abort leaves it alone.
        bg.handle(Command::RequestAbort {
            client_id: "panel".into(),
            request_id: 1,
        });
        assert_eq!(
            bg.store().load_state("panel").unwrap().unwrap().status,
            Status::Aborted
        );
    }

    #[tokio::test]
    async fn save_state_replaces_stored_state() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        let cmd: Command = serde_json::from_value(json!({
            "action": "save-state",
            "clientId": "panel",
            "state": {"searchString": "Globex", "status": "IDLE"},
        }))
        .unwrap();
        assert_eq!(cmd.action(), "save-state");

        let resp = serde_json::to_value(bg.handle(cmd)).unwrap();
        assert_eq!(resp["state"]["searchString"], "Globex");

        let resp = bg.handle(Command::GetState {
            client_id: "panel".into(),
        });
        let CommandResponse::State { state, .. } = resp else {
            panic!("expected state, got {resp:?}");
        };
        assert_eq!(state.search_string, "Globex");
    }

    #[tokio::test]
    async fn unacknowledged_outcomes_are_replayed() {
        let transport = MockTransport::new(MockReply::json(200, json!({"content": "# Acme"})));
        let bg = controller(&transport);
        let mut rx = bg.subscribe();
        assert!(bg.undelivered("panel").is_empty());

        bg.handle(research(Some("sk"), "Acme"));
        let done = next_done(&mut rx).await;
        assert_eq!(bg.undelivered("panel"), vec![done]);
        assert!(bg.undelivered("other").is_empty());

        bg.handle(Command::ResearchCompanyAck {
            client_id: "panel".into(),
            request_id: 1,
        });
        assert!(bg.undelivered("panel").is_empty());
    }

    #[tokio::test]
    async fn running_requests_are_not_replayed() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        bg.handle(research(Some("sk"), "Acme"));
        assert_eq!(bg.requests_for("panel").len(), 1);
        assert!(bg.undelivered("panel").is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_requests() {
        let transport = MockTransport::new(MockReply::Hang);
        let bg = controller(&transport);
        bg.handle(research(Some("sk"), "Acme"));
        bg.shutdown();
        assert!(bg.requests_for("panel").is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.dropped.load(std::sync::atomic::Ordering::SeqCst));
    }
}
