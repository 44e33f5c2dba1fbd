//! Credentials accepted by the Zendesk REST API.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// How a request authenticates against Zendesk.
#[derive(Clone)]
pub enum Credential {
    /// Shared service account (HTTP basic auth).
    Basic {
        /// Account user name or email.
        username: String,
        /// Password or API token.
        password: SecretString,
    },
    /// Per-user OAuth access token.
    Bearer(SecretString),
}

impl Credential {
    /// Shared service account credential.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: SecretString::new(password.into().into()),
        }
    }

    /// OAuth bearer credential.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(SecretString::new(token.into().into()))
    }

    /// Attach this credential to a request.
    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Basic { username, password } => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
            Self::Bearer(token) => request.bearer_auth(token.expose_secret()),
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Bearer(_) => "bearer",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
        }
    }
}
