//! Per-invocation credential resolution.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use zendesk_api::{ApiError, ApiHost, Credential, ServiceUrl};

use super::store::CredentialStore;

/// How strictly a command needs the caller's own identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Use the caller's token when connected, else the service account.
    PreferUser,
    /// Only the caller's token is acceptable.
    RequireUser,
}

/// Whose identity performs the upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// The shared service account.
    ServiceAccount,
    /// A connected chat user.
    User(String),
}

/// Why no handle could be produced.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The caller has no stored token and no fallback applies.
    #[error("not connected to Zendesk")]
    NotConnected,

    /// The configured service URL is unusable.
    #[error("Invalid Zendesk configuration: {0}")]
    Config(#[from] ApiError),
}

/// A credential bound to the helpdesk host, built for one request.
#[derive(Debug, Clone)]
pub struct AuthorizedClientHandle {
    host: ApiHost,
    credential: Credential,
    principal: Principal,
}

impl AuthorizedClientHandle {
    /// API host the credential is valid for.
    pub fn host(&self) -> &ApiHost {
        &self.host
    }

    /// The credential to present.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Identity the call is made under.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

/// Decides, per invocation, which credential reaches Zendesk.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    service_url: String,
    shared: Option<Credential>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("service_url", &self.service_url)
            .field("shared", &self.shared)
            .finish()
    }
}

impl CredentialResolver {
    /// Resolver backed by `store` for the given configured service URL.
    pub fn new(store: Arc<dyn CredentialStore>, service_url: impl Into<String>) -> Self {
        Self {
            store,
            service_url: service_url.into(),
            shared: None,
        }
    }

    /// Enable the shared service account fallback.
    pub fn with_shared_credential(mut self, credential: Credential) -> Self {
        self.shared = Some(credential);
        self
    }

    /// Build the handle `user_id` should use under `requirement`.
    pub async fn resolve(
        &self,
        user_id: &str,
        requirement: Requirement,
    ) -> Result<AuthorizedClientHandle, ResolveError> {
        let host = ApiHost::from_service_url(&self.service_url)?;

        if let Some(token) = self.store.get(user_id).await {
            debug!(user_id, host = %host, "Resolved per-user credential");
            return Ok(AuthorizedClientHandle {
                host,
                credential: Credential::bearer(token.access_token()),
                principal: Principal::User(user_id.to_string()),
            });
        }

        match (requirement, &self.shared) {
            (Requirement::PreferUser, Some(shared)) => {
                debug!(user_id, host = %host, "Falling back to service account");
                Ok(AuthorizedClientHandle {
                    host,
                    credential: shared.clone(),
                    principal: Principal::ServiceAccount,
                })
            }
            _ => Err(ResolveError::NotConnected),
        }
    }

    /// Origin of the configured helpdesk, for links shown to users.
    pub fn service_origin(&self) -> Result<String, ResolveError> {
        Ok(ServiceUrl::parse(&self.service_url)?.origin())
    }
}
