//! OAuth authorization-code flow linking a chat user to Zendesk.
//!
//! The flow has no server-side state besides its final result:
//! - `/user/connect` redirects the browser to [`OAuthFlow::authorization_url`]
//! - Zendesk sends the browser back to `/oauth/redirect` with a `code`
//! - [`OAuthFlow::complete`] exchanges the code and stores the token
//!
//! Every callback outcome is rendered by [`callback_page`] as a 200 page.
//! The access token and client secret never appear in pages or logs.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use zendesk_api::ServiceUrl;

use crate::config::BridgeConfig;
use crate::credentials::{CredentialStore, StoredToken};
use crate::error::ConfigError;

/// Path of the provider's authorization page.
const AUTHORIZE_PATH: &str = "/oauth/authorizations/new";

/// Path of the provider's token endpoint.
const TOKEN_PATH: &str = "/oauth/tokens";

/// Path of this service's callback endpoint.
pub const REDIRECT_PATH: &str = "/oauth/redirect";

/// Longest provider error body echoed back to the user.
const MAX_ERROR_BODY: usize = 300;

/// Why a callback did not produce a connected account.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The user declined, or the provider reported an error.
    #[error("Authorization was denied: {0}")]
    Denied(String),

    /// The callback carried no authorization code.
    #[error("Missing authorization code.")]
    MissingCode,

    /// The callback could not be attributed to a chat user.
    #[error("Could not determine which chat user is connecting. Open the link from the chat client.")]
    MissingIdentity,

    /// The callback parameters could not be parsed.
    #[error("Something went wrong: {0}")]
    Malformed(String),

    /// The token endpoint did not answer in time.
    #[error("Timed out waiting for Zendesk to issue an access token.")]
    Timeout,

    /// The token endpoint could not be reached.
    #[error("Something went wrong: {0}")]
    Transport(String),

    /// The token endpoint refused the exchange.
    #[error("Could not obtain OAuth access token from Zendesk ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The token endpoint answered with something other than a token.
    #[error("Something went wrong: unexpected token response: {0}")]
    Decode(String),

    /// The token endpoint answered without an access token.
    #[error("Zendesk did not return an access token.")]
    EmptyToken,
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OAuthError::Timeout
        } else if err.is_decode() {
            OAuthError::Decode(err.to_string())
        } else {
            // Strip the URL; it is ours and adds nothing for the user.
            OAuthError::Transport(err.without_url().to_string())
        }
    }
}

/// Parameters Zendesk appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    scope: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAccount {
    pub user_id: String,
    pub scope: Option<String>,
}

/// Static OAuth client settings.
#[derive(Clone)]
pub struct OAuthSettings {
    service: ServiceUrl,
    public_base: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
    token_ttl: Option<chrono::Duration>,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("service", &self.service)
            .field("public_base", &self.public_base)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl OAuthSettings {
    /// Build settings from a validated config.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        let service = ServiceUrl::parse(&config.zendesk.url)
            .map_err(|e| ConfigError::Invalid(format!("zendesk.url: {}", e)))?;
        let client_secret = config
            .zendesk
            .client_secret
            .clone()
            .ok_or_else(|| ConfigError::Invalid("zendesk.client_secret is not set".to_string()))?;

        let token_ttl = match config.zendesk.token_ttl_secs {
            Some(secs) => Some(
                i64::try_from(secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!("zendesk.token_ttl_secs {} is out of range", secs))
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            service,
            public_base: config.public_base().to_string(),
            client_id: config.zendesk.client_id.clone(),
            client_secret: SecretString::new(client_secret.into()),
            scope: config.zendesk.scope.clone(),
            token_ttl,
        })
    }

    /// Callback URL registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.public_base, REDIRECT_PATH)
    }
}

/// Drives the connect and disconnect transitions.
#[derive(Clone)]
pub struct OAuthFlow {
    settings: OAuthSettings,
    http: reqwest::Client,
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for OAuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthFlow")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OAuthFlow {
    /// `http` should carry the upstream request timeout.
    pub fn new(
        settings: OAuthSettings,
        http: reqwest::Client,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            settings,
            http,
            store,
        }
    }

    /// Provider page the browser is sent to on connect.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}{}?response_type=code&redirect_uri={}&client_id={}&scope={}",
            self.settings.service.origin(),
            AUTHORIZE_PATH,
            urlencoding::encode(&self.settings.redirect_uri()),
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.scope),
        )
    }

    /// Handle the provider callback for `user_id`.
    ///
    /// The store is written only after a token was obtained.
    pub async fn complete(
        &self,
        user_id: Option<&str>,
        params: CallbackParams,
    ) -> Result<ConnectedAccount, OAuthError> {
        if let Some(error) = params.error {
            let reason = match params.error_description {
                Some(description) => format!("{} ({})", error, description),
                None => error,
            };
            warn!("OAuth authorization denied: {}", reason);
            return Err(OAuthError::Denied(reason));
        }

        let code = match params.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => {
                warn!("OAuth callback missing code parameter");
                return Err(OAuthError::MissingCode);
            }
        };

        let user_id = match user_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!("OAuth callback without caller identity");
                return Err(OAuthError::MissingIdentity);
            }
        };

        let response = self.exchange_code(&code).await.inspect_err(|e| {
            error!(user_id = %user_id, "Token exchange failed: {}", e);
        })?;

        let access_token = match response.access_token {
            Some(token) if !token.is_empty() => token,
            _ => {
                error!(user_id = %user_id, "Token response had no access token");
                return Err(OAuthError::EmptyToken);
            }
        };

        let provider_ttl = match response.expires_in.filter(|secs| *secs > 0) {
            Some(secs) => {
                let ttl = chrono::Duration::try_seconds(secs);
                if ttl.is_none() {
                    warn!(user_id = %user_id, expires_in = secs, "Ignoring out-of-range token lifetime");
                }
                ttl
            }
            None => None,
        };
        let ttl = match (provider_ttl, self.settings.token_ttl) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut token = StoredToken::new(access_token).with_scope(response.scope.clone());
        if let Some(ttl) = ttl {
            token = token.with_ttl(ttl);
        }
        self.store.put(&user_id, token).await;

        info!(user_id = %user_id, "Connected Zendesk account");
        Ok(ConnectedAccount {
            user_id,
            scope: response.scope,
        })
    }

    /// Forget `user_id`'s token. Returns whether one was stored.
    pub async fn disconnect(&self, user_id: &str) -> bool {
        let removed = self.store.remove(user_id).await.is_some();
        if removed {
            info!(user_id, "Disconnected Zendesk account");
        } else {
            debug!(user_id, "Disconnect requested but no account was connected");
        }
        removed
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuthError> {
        let redirect_uri = self.settings.redirect_uri();
        let body = TokenRequest {
            grant_type: "authorization_code",
            code,
            client_id: &self.settings.client_id,
            client_secret: self.settings.client_secret.expose_secret(),
            redirect_uri: &redirect_uri,
            scope: &self.settings.scope,
        };

        let url = self.settings.service.join(TOKEN_PATH);
        debug!(url = %url, "Exchanging authorization code");

        let resp = self.http.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OAuthError::Rejected {
                status: status.as_u16(),
                body: crate::messages::truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| OAuthError::Decode(e.to_string()))
    }
}

/// Render the browser page for a callback outcome.
pub fn callback_page(outcome: &Result<ConnectedAccount, OAuthError>) -> String {
    match outcome {
        Ok(_) => page(
            "Zendesk - Connected",
            "Zendesk account connected",
            "Your chat account is now linked to Zendesk. You can close this window.",
        ),
        Err(err) => page(
            "Zendesk - Connection Failed",
            "Connection failed",
            &escape_html(&err.to_string()),
        ),
    }
}

fn page(title: &str, heading: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{}</title></head>
<body>
<h1>{}</h1>
<p>{}</p>
<p><a href="javascript:window.close()">Close this window</a></p>
</body>
</html>"#,
        title, heading, message
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
