//! Bridge configuration.
//!
//! Supports loading configuration from:
//! - A TOML file (`--config`)
//! - Environment variables (override file values)
//!
//! Everything is validated once at startup by [`BridgeConfig::validate`].

use std::path::Path;
use std::time::Duration;

use axum::http::HeaderName;
use serde::Deserialize;
use tracing::{debug, warn};
use zendesk_api::{Credential, RetryPolicy, ServiceUrl};

use crate::error::ConfigError;

/// Default OAuth client id registered for this integration.
pub const DEFAULT_CLIENT_ID: &str = "mattermost_integration_for_zendesk";

/// Longest accepted `zendesk.token_ttl_secs` (ten years).
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Clone, Deserialize)]
pub struct BridgeConfig {
    /// Listen address (e.g., "0.0.0.0:8066").
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Externally reachable base URL of this service, used for OAuth
    /// redirects and connect links.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Trigger word of the slash command.
    #[serde(default = "default_trigger")]
    pub trigger: String,

    /// Header carrying the authenticated chat user id on browser requests.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Shared token the chat server sends with every slash command.
    #[serde(default)]
    pub command_token: Option<String>,

    /// Accept slash commands without a `command_token`. Any caller can then
    /// act as any connected user.
    #[serde(default)]
    pub allow_unauthenticated_commands: bool,

    /// Timeout for every upstream HTTP call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Retry policy for ticket service calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Helpdesk settings.
    #[serde(default)]
    pub zendesk: ZendeskConfig,
}

/// Zendesk connection settings.
#[derive(Clone, Deserialize)]
pub struct ZendeskConfig {
    /// Helpdesk base URL (`acme.zendesk.com` or `https://acme.zendesk.com/...`).
    #[serde(default)]
    pub url: String,

    /// Explicit REST root, bypassing host derivation (self-hosted proxies, testing).
    #[serde(default)]
    pub api_url: Option<String>,

    /// OAuth client id.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Requested OAuth scope.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Shared service account user.
    #[serde(default)]
    pub username: Option<String>,

    /// Shared service account password or API token.
    #[serde(default)]
    pub password: Option<String>,

    /// Upper bound on how long a per-user token is used, in seconds.
    #[serde(default)]
    pub token_ttl_secs: Option<u64>,
}

/// Retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total sends per call, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8066".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8066".to_string()
}

fn default_trigger() -> String {
    "/zendesk".to_string()
}

fn default_identity_header() -> String {
    "Mattermost-User-ID".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_scope() -> String {
    "read write".to_string()
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    250
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_url: default_public_url(),
            trigger: default_trigger(),
            identity_header: default_identity_header(),
            command_token: None,
            allow_unauthenticated_commands: false,
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            retry: RetryConfig::default(),
            zendesk: ZendeskConfig::default(),
        }
    }
}

impl Default for ZendeskConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_url: None,
            client_id: default_client_id(),
            client_secret: None,
            scope: default_scope(),
            username: None,
            password: None,
            token_ttl_secs: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("listen_addr", &self.listen_addr)
            .field("public_url", &self.public_url)
            .field("trigger", &self.trigger)
            .field("identity_header", &self.identity_header)
            .field(
                "command_token",
                &self.command_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "allow_unauthenticated_commands",
                &self.allow_unauthenticated_commands,
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("retry", &self.retry)
            .field("zendesk", &self.zendesk)
            .finish()
    }
}

impl std::fmt::Debug for ZendeskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZendeskConfig")
            .field("url", &self.url)
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env();
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("BRIDGE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(url) = var("BRIDGE_PUBLIC_URL") {
            self.public_url = url;
        }
        if let Some(trigger) = var("BRIDGE_TRIGGER") {
            self.trigger = trigger;
        }
        if let Some(header) = var("BRIDGE_IDENTITY_HEADER") {
            self.identity_header = header;
        }
        if let Some(token) = var("BRIDGE_COMMAND_TOKEN") {
            self.command_token = Some(token);
        }
        if let Some(allow) = var("BRIDGE_ALLOW_UNAUTHENTICATED_COMMANDS") {
            match allow.parse() {
                Ok(allow) => self.allow_unauthenticated_commands = allow,
                Err(_) => warn!(
                    "Ignoring non-boolean BRIDGE_ALLOW_UNAUTHENTICATED_COMMANDS={}",
                    allow
                ),
            }
        }
        if let Some(url) = var("ZENDESK_URL") {
            self.zendesk.url = url;
        }
        if let Some(url) = var("ZENDESK_API_URL") {
            self.zendesk.api_url = Some(url);
        }
        if let Some(id) = var("ZENDESK_CLIENT_ID") {
            self.zendesk.client_id = id;
        }
        if let Some(secret) = var("ZENDESK_CLIENT_SECRET") {
            self.zendesk.client_secret = Some(secret);
        }
        if let Some(user) = var("ZENDESK_USER") {
            self.zendesk.username = Some(user);
        }
        if let Some(password) = var("ZENDESK_PASSWORD") {
            self.zendesk.password = Some(password);
        }
        if let Some(ttl) = var("ZENDESK_TOKEN_TTL_SECS") {
            match ttl.parse() {
                Ok(secs) => self.zendesk.token_ttl_secs = Some(secs),
                Err(_) => warn!("Ignoring non-numeric ZENDESK_TOKEN_TTL_SECS={}", ttl),
            }
        }
    }

    /// Check everything that can be checked without network access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ServiceUrl::parse(&self.zendesk.url)
            .and_then(|url| url.api_host())
            .map_err(|e| ConfigError::Invalid(format!("zendesk.url: {}", e)))?;

        ServiceUrl::parse(&self.public_url)
            .map_err(|e| ConfigError::Invalid(format!("public_url: {}", e)))?;

        if let Some(api_url) = &self.zendesk.api_url {
            reqwest::Url::parse(api_url)
                .map_err(|e| ConfigError::Invalid(format!("zendesk.api_url: {}", e)))?;
        }

        if self.trigger.is_empty() || self.trigger.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "trigger `{}` must be a single word",
                self.trigger
            )));
        }

        HeaderName::from_bytes(self.identity_header.as_bytes()).map_err(|_| {
            ConfigError::Invalid(format!(
                "identity_header `{}` is not a valid header name",
                self.identity_header
            ))
        })?;

        if self.zendesk.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("zendesk.client_id is empty".to_string()));
        }
        if self
            .zendesk
            .client_secret
            .as_deref()
            .is_none_or(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "zendesk.client_secret is required for the OAuth flow".to_string(),
            ));
        }

        if self.zendesk.username.is_some() != self.zendesk.password.is_some() {
            return Err(ConfigError::Invalid(
                "zendesk.username and zendesk.password must be set together".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if let Some(ttl) = self.zendesk.token_ttl_secs {
            if ttl == 0 || ttl > MAX_TOKEN_TTL_SECS {
                return Err(ConfigError::Invalid(format!(
                    "zendesk.token_ttl_secs must be between 1 and {}",
                    MAX_TOKEN_TTL_SECS
                )));
            }
        }

        match self.command_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => {}
            _ if self.allow_unauthenticated_commands => {
                warn!("No command_token configured; slash command requests are not authenticated");
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "command_token is required unless allow_unauthenticated_commands is set"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Base URL of this service without a trailing slash.
    pub fn public_base(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    /// Upstream request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry policy for ticket service calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            delay: Duration::from_millis(self.retry.delay_ms),
        }
    }

    /// Shared service account, when configured.
    pub fn shared_credential(&self) -> Option<Credential> {
        match (&self.zendesk.username, &self.zendesk.password) {
            (Some(user), Some(password)) => Some(Credential::basic(user, password)),
            _ => None,
        }
    }
}
