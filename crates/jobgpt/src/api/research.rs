//! The research client: one cancellable call per company query.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{HttpTransport, ResearchRequest, ResearchResponse, Transport};
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::prompt::create_prompts;

/// A research call in flight. Resolves to the parsed reply, an
/// [`Api`](ResearchError::Api) error, or [`Aborted`](ResearchError::Aborted)
/// once its token is cancelled.
pub type PendingResearch =
    Pin<Box<dyn Future<Output = Result<ResearchResponse, ResearchError>> + Send + 'static>>;

/// Builds research prompts and sends them through a [`Transport`].
#[derive(Clone)]
pub struct Researcher {
    config: ResearchConfig,
    transport: Arc<dyn Transport>,
}

impl Researcher {
    /// Create a researcher talking HTTP to `config.endpoint`.
    pub fn new(config: ResearchConfig) -> Result<Self, ResearchError> {
        let transport = HttpTransport::new(config.endpoint.clone())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ResearchConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Request body for `query`.
    pub fn build_request(&self, query: &str) -> ResearchRequest {
        ResearchRequest::from_config(&self.config, create_prompts(query))
    }

    /// Start researching `query` with a fresh cancellation token.
    ///
    /// Cancelling the returned token drops the in-flight call and resolves
    /// the pending result with [`ResearchError::Aborted`].
    pub fn research_company(
        &self,
        credential: &str,
        query: &str,
    ) -> (PendingResearch, CancellationToken) {
        let token = CancellationToken::new();
        let pending = self.research_company_with(credential, query, token.clone());
        (pending, token)
    }

    /// Start researching `query`, observing a caller-owned token.
    pub fn research_company_with(
        &self,
        credential: &str,
        query: &str,
        token: CancellationToken,
    ) -> PendingResearch {
        info!("Researching company: {query}");
        let call = self.transport.send(credential, &self.build_request(query));
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ResearchError::Aborted),
                result = call => result,
            }
        })
    }
}
