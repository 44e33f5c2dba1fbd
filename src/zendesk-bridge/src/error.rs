//! Error types for the bridge.
//!
//! Command failures never reach the transport: every [`CommandError`] is
//! rendered into a reply for the invoking user.

use thiserror::Error;
use zendesk_api::ApiError;

use crate::credentials::ResolveError;
use crate::router::RouterError;

/// Configuration loading or validation failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Could not read config: {0}")]
    Read(String),

    /// The config file is not valid TOML for [`crate::config::BridgeConfig`].
    #[error("Could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A command that could not be carried out.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Missing or malformed arguments; the message tells the user what to type.
    #[error("{0}")]
    Usage(String),

    /// The command needs the caller's own Zendesk session.
    #[error("not connected to Zendesk")]
    NotConnected,

    /// Zendesk returned an error or could not be reached.
    #[error("{0}")]
    Upstream(#[from] ApiError),

    /// The bridge is misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CommandError {
    /// Text shown to the invoking user.
    pub fn user_message(&self, trigger: &str) -> String {
        match self {
            Self::Usage(message) => message.clone(),
            Self::NotConnected => format!(
                "Your Zendesk account is not connected. Run `{} connect` to link it.",
                trigger
            ),
            Self::Upstream(err) => err.to_string(),
            Self::Config(message) => format!("Configuration error: {}", message),
        }
    }
}

impl From<ResolveError> for CommandError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotConnected => CommandError::NotConnected,
            ResolveError::Config(e) => CommandError::Config(e.to_string()),
        }
    }
}

/// Startup failure.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The verb table could not be built.
    #[error("Invalid verb table: {0}")]
    Router(#[from] RouterError),

    /// The HTTP client could not be created.
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}
