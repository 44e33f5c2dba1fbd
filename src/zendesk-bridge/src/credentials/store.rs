//! Per-user OAuth token storage.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::debug;

/// An OAuth access token issued to one chat user.
#[derive(Clone)]
pub struct StoredToken {
    access_token: SecretString,
    /// Scope granted by the provider, if reported.
    pub scope: Option<String>,
    /// When the exchange completed.
    pub obtained_at: DateTime<Utc>,
    /// When the token stops being used; `None` means never.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Token obtained now, without expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into().into()),
            scope: None,
            obtained_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Set the granted scope.
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Expire `ttl` after `obtained_at`. A deadline past the calendar range
    /// means no expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = self.obtained_at.checked_add_signed(ttl);
        self
    }

    /// The bearer token.
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Whether the token is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("obtained_at", &self.obtained_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Storage for per-user tokens, keyed by chat user id.
///
/// Implementations must tolerate concurrent calls from independent requests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The live token of `user_id`. Expired tokens read as absent.
    async fn get(&self, user_id: &str) -> Option<StoredToken>;

    /// Store a token, replacing any previous one.
    async fn put(&self, user_id: &str, token: StoredToken);

    /// Remove and return the token of `user_id`.
    async fn remove(&self, user_id: &str) -> Option<StoredToken>;
}

/// Process-memory store. Tokens are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<HashMap<String, StoredToken>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, expired ones included.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Whether no token is stored.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, user_id: &str) -> Option<StoredToken> {
        let now = Utc::now();
        {
            let tokens = self.tokens.read().await;
            match tokens.get(user_id) {
                None => return None,
                Some(token) if !token.is_expired_at(now) => return Some(token.clone()),
                Some(_) => {}
            }
        }

        let mut tokens = self.tokens.write().await;
        // Re-check: a fresh token may have been stored between the two locks.
        if tokens.get(user_id).is_some_and(|t| t.is_expired_at(now)) {
            tokens.remove(user_id);
            debug!(user_id, "Purged expired token");
        }
        tokens
            .get(user_id)
            .filter(|t| !t.is_expired_at(now))
            .cloned()
    }

    async fn put(&self, user_id: &str, token: StoredToken) {
        self.tokens.write().await.insert(user_id.to_string(), token);
    }

    async fn remove(&self, user_id: &str) -> Option<StoredToken> {
        self.tokens.write().await.remove(user_id)
    }
}
