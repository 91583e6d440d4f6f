use std::sync::Arc;

use tracing::{info, warn};

use super::{PanelEvent, PanelState, PanelView, Status, reduce, render};
use crate::background::{BackgroundController, Command, CommandResponse, Notification};
use crate::error::ErrorCode;
use crate::registry::RequestSummary;

/// Drives one panel's state machine against the background controller.
///
/// Handles a single tracked request at a time: the action button either
/// submits the current query or, while loading, cancels the tracked request.
/// Every transition is persisted under the panel's client id.
pub struct PanelController {
    client_id: String,
    background: Arc<BackgroundController>,
    state: PanelState,
    requests: Vec<RequestSummary>,
    credential: Option<String>,
}

impl PanelController {
    /// Restore the panel for `client_id` from the store and the
    /// background's live requests.
    pub fn new(client_id: impl Into<String>, background: Arc<BackgroundController>) -> Self {
        let client_id = client_id.into();
        info!("Sending initial get-requests for client {client_id}");
        let requests = background.requests_for(&client_id);
        let state = background
            .store()
            .load_state(&client_id)
            .unwrap_or_else(|e| {
                warn!("Failed to load state for {client_id}: {e}");
                None
            })
            .unwrap_or_default();

        let mut panel = Self {
            client_id,
            background,
            state,
            requests,
            credential: None,
        };
        // Completions that finished while no panel was listening.
        for done in panel.background.undelivered(&panel.client_id) {
            panel.handle_notification(&done);
        }
        // A loading snapshot whose request died with a previous process
        // would otherwise spin forever.
        if panel.state.status == Status::Loading && panel.requests.is_empty() {
            warn!("Restored a loading state with no live request");
            panel.apply(PanelEvent::AbortRejected);
        }
        panel
    }

    /// Use `credential` instead of the stored key. `None` reverts to the
    /// store.
    pub fn set_credential(&mut self, credential: Option<String>) {
        self.credential = credential
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn view(&self) -> PanelView {
        render(&self.state)
    }

    pub fn tracked_requests(&self) -> &[RequestSummary] {
        &self.requests
    }

    /// The user edited the query.
    pub fn input(&mut self, text: &str) {
        self.apply(PanelEvent::InputChanged(text.to_string()));
    }

    /// The user pressed the action button with `query` in the input.
    pub fn activate(&mut self, query: &str) {
        if self.state.status == Status::Loading {
            self.abort();
        } else {
            self.submit(query);
        }
    }

    fn submit(&mut self, query: &str) {
        let search_string = query.trim();
        if search_string.is_empty() {
            return;
        }

        let Some(api_key) = self.credential() else {
            warn!("API key is not set; opening options");
            self.apply(PanelEvent::MissingCredential);
            return;
        };

        info!(
            "Sending research request for client {}: {search_string}",
            self.client_id
        );
        let response = self.background.handle(Command::ResearchCompany {
            client_id: self.client_id.clone(),
            api_key: Some(api_key),
            search_string: search_string.to_string(),
        });
        match response {
            CommandResponse::Accepted { request, .. } => {
                self.requests.push(request);
                self.apply(PanelEvent::Submitted {
                    search_string: search_string.to_string(),
                });
            }
            CommandResponse::Rejected {
                error: ErrorCode::MissingApiKey,
                ..
            } => self.apply(PanelEvent::MissingCredential),
            CommandResponse::Rejected { data, .. } => {
                self.apply(PanelEvent::Failed { message: data })
            }
            other => warn!("Unexpected reply to research-company: {other:?}"),
        }
    }

    fn abort(&mut self) {
        info!("Sending abort for client {}", self.client_id);
        let command = match self.requests.first() {
            Some(request) => Command::RequestAbort {
                client_id: self.client_id.clone(),
                request_id: request.id,
            },
            None => Command::ResearchCompanyAbort {
                client_id: self.client_id.clone(),
            },
        };
        match self.background.handle(command) {
            CommandResponse::Cancelled { request_id, .. } => {
                self.requests.retain(|r| r.id != request_id);
                self.apply(PanelEvent::AbortConfirmed);
            }
            _ => {
                self.requests.clear();
                self.apply(PanelEvent::AbortRejected);
            }
        }
    }

    /// Handle a broadcast notification. Returns `true` when it completed
    /// this panel's tracked request.
    pub fn handle_notification(&mut self, notification: &Notification) -> bool {
        if notification.client_id() != self.client_id {
            return false;
        }
        let request_id = notification.request_id();
        if !self.requests.iter().any(|r| r.id == request_id) {
            return false;
        }
        let Some(outcome) = notification.outcome() else {
            return false;
        };

        let ack = self.background.handle(Command::ResearchCompanyAck {
            client_id: self.client_id.clone(),
            request_id,
        });
        if ack.error().is_some() {
            warn!("Ack for request {request_id} was not accepted");
        }
        self.requests.retain(|r| r.id != request_id);

        self.apply(outcome.event());
        true
    }

    fn credential(&self) -> Option<String> {
        if self.credential.is_some() {
            return self.credential.clone();
        }
        self.background.store().api_key().unwrap_or_else(|e| {
            warn!("Failed to read stored API key: {e}");
            None
        })
    }

    fn apply(&mut self, event: PanelEvent) {
        self.state = reduce(std::mem::take(&mut self.state), event);
        if let Err(e) = self.background.store().save_state(&self.client_id, &self.state) {
            warn!("Failed to save state for {}: {e}", self.client_id);
        }
    }
}
