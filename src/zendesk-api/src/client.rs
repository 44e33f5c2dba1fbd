//! Ticket service abstraction and its reqwest implementation.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::credential::Credential;
use crate::error::{ApiError, ApiResult};
use crate::host::ApiHost;
use crate::retry::{Idempotency, RetryPolicy};
use crate::types::{
    Comment, CommentPage, Organization, OrganizationEnvelope, Ticket, TicketEnvelope, TicketId,
    TicketUpdate, TicketUpdateEnvelope, TicketView, Visibility,
};

/// Upper bound on comment pages followed for a single ticket.
const MAX_COMMENT_PAGES: usize = 50;

/// Operations the command handlers need from the helpdesk.
#[async_trait]
pub trait TicketService: Send + Sync {
    /// Fetch a ticket with its requester and assignee sideloaded.
    async fn fetch_ticket(&self, id: TicketId) -> ApiResult<TicketView>;

    /// Fetch an organization.
    async fn fetch_organization(&self, id: u64) -> ApiResult<Organization>;

    /// All comments of a ticket, oldest first.
    async fn list_comments(&self, id: TicketId) -> ApiResult<Vec<Comment>>;

    /// Apply a partial update to a ticket.
    async fn update_ticket(&self, id: TicketId, update: &TicketUpdate) -> ApiResult<Ticket>;

    /// Add a comment with the given visibility.
    async fn post_comment(
        &self,
        id: TicketId,
        body: &str,
        visibility: Visibility,
    ) -> ApiResult<Ticket> {
        self.update_ticket(id, &TicketUpdate::comment(body, visibility))
            .await
    }
}

/// Zendesk REST v2 client bound to one account and one credential.
#[derive(Debug, Clone)]
pub struct ZendeskClient {
    http: reqwest::Client,
    api_root: Url,
    credential: Credential,
    retry: RetryPolicy,
}

impl ZendeskClient {
    /// Create a client for an explicit API root (e.g. `https://acme.zendesk.com/api/v2/`).
    pub fn new(http: reqwest::Client, mut api_root: Url, credential: Credential) -> Self {
        if !api_root.path().ends_with('/') {
            let path = format!("{}/", api_root.path());
            api_root.set_path(&path);
        }
        Self {
            http,
            api_root,
            credential,
            retry: RetryPolicy::default(),
        }
    }

    /// Create a client for a hosted Zendesk account.
    pub fn for_host(
        http: reqwest::Client,
        host: &ApiHost,
        credential: Credential,
    ) -> ApiResult<Self> {
        Ok(Self::new(http, host.api_root()?, credential))
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The API root this client talks to.
    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.api_root.join(path)?)
    }

    /// Pagination links must stay on the API host; the credential goes with them.
    fn same_origin(&self, link: Url) -> ApiResult<Url> {
        if link.origin() != self.api_root.origin() {
            warn!(link = %link, "Refusing pagination link to another host");
            return Err(ApiError::Decode(format!(
                "next_page points outside {}",
                self.api_root.origin().ascii_serialization()
            )));
        }
        Ok(link)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        idempotency: Idempotency,
    ) -> ApiResult<T> {
        let mut attempt = 1;
        loop {
            match self.send_once(method.clone(), url.clone(), body).await {
                Err(err) if self.retry.should_retry(attempt, &err, idempotency) => {
                    let pause = self.retry.backoff(&err);
                    warn!(
                        method = %method,
                        url = %url,
                        attempt,
                        error = %err,
                        "Zendesk request failed, retrying in {:?}",
                        pause
                    );
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> ApiResult<T> {
        debug!(method = %method, url = %url, auth = self.credential.kind(), "Zendesk request");

        let mut request = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");
        request = self.credential.apply(request);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(30);
            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl TicketService for ZendeskClient {
    async fn fetch_ticket(&self, id: TicketId) -> ApiResult<TicketView> {
        let url = self.endpoint(&format!("tickets/{}.json?include=users", id))?;
        self.execute(Method::GET, url, None, Idempotency::Idempotent)
            .await
    }

    async fn fetch_organization(&self, id: u64) -> ApiResult<Organization> {
        let url = self.endpoint(&format!("organizations/{}.json", id))?;
        let envelope: OrganizationEnvelope = self
            .execute(Method::GET, url, None, Idempotency::Idempotent)
            .await?;
        Ok(envelope.organization)
    }

    async fn list_comments(&self, id: TicketId) -> ApiResult<Vec<Comment>> {
        let mut comments = Vec::new();
        let mut next = Some(self.endpoint(&format!("tickets/{}/comments.json", id))?);
        let mut pages = 0;

        while let Some(url) = next.take() {
            let page: CommentPage = self
                .execute(Method::GET, url, None, Idempotency::Idempotent)
                .await?;
            comments.extend(page.comments);
            pages += 1;

            if pages >= MAX_COMMENT_PAGES {
                warn!(ticket = id, pages, "Stopped following comment pages");
                break;
            }
            next = match page.next_page {
                Some(link) => Some(self.same_origin(Url::parse(&link)?)?),
                None => None,
            };
        }

        debug!(ticket = id, count = comments.len(), "Listed ticket comments");
        Ok(comments)
    }

    async fn update_ticket(&self, id: TicketId, update: &TicketUpdate) -> ApiResult<Ticket> {
        let url = self.endpoint(&format!("tickets/{}.json", id))?;
        let body = serde_json::to_value(TicketUpdateEnvelope { ticket: update })?;
        let envelope: TicketEnvelope = self
            .execute(Method::PUT, url, Some(&body), Idempotency::NonIdempotent)
            .await?;
        Ok(envelope.ticket)
    }
}
