//! Builds ticket service clients from resolved credentials.

use std::sync::Arc;

use reqwest::Url;
use tracing::debug;
use zendesk_api::{ApiResult, RetryPolicy, TicketService, ZendeskClient};

use crate::credentials::AuthorizedClientHandle;

/// Turns a per-invocation handle into a ticket service.
pub trait TicketServiceFactory: Send + Sync {
    fn build(&self, handle: &AuthorizedClientHandle) -> ApiResult<Arc<dyn TicketService>>;
}

/// Produces [`ZendeskClient`]s sharing one connection pool.
#[derive(Debug, Clone)]
pub struct ZendeskClientFactory {
    http: reqwest::Client,
    api_root: Option<Url>,
    retry: RetryPolicy,
}

impl ZendeskClientFactory {
    /// `http` should carry the upstream request timeout.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api_root: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Talk to `api_root` instead of the hosted account derived from the handle.
    pub fn with_api_root(mut self, api_root: Option<Url>) -> Self {
        self.api_root = api_root;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl TicketServiceFactory for ZendeskClientFactory {
    fn build(&self, handle: &AuthorizedClientHandle) -> ApiResult<Arc<dyn TicketService>> {
        let credential = handle.credential().clone();
        let client = match &self.api_root {
            Some(root) => ZendeskClient::new(self.http.clone(), root.clone(), credential),
            None => ZendeskClient::for_host(self.http.clone(), handle.host(), credential)?,
        }
        .with_retry(self.retry.clone());

        debug!(
            api_root = %client.api_root(),
            credential = handle.credential().kind(),
            "Built Zendesk client"
        );
        let service: Arc<dyn TicketService> = Arc::new(client);
        Ok(service)
    }
}
