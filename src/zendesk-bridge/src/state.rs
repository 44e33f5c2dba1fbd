//! Application state shared by all routes.

use std::sync::Arc;

use axum::http::HeaderName;
use reqwest::Url;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::BridgeConfig;
use crate::credentials::{CredentialResolver, CredentialStore, MemoryCredentialStore};
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, ConfigError};
use crate::factory::{TicketServiceFactory, ZendeskClientFactory};
use crate::handlers::CommandHandlers;
use crate::oauth::{OAuthFlow, OAuthSettings};
use crate::sink::{ReplySink, ResponseUrlSink};
use crate::verbs::Verb;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<BridgeConfig>,
    /// Command dispatcher.
    pub dispatcher: Dispatcher,
    /// OAuth controller.
    pub oauth: OAuthFlow,
    /// Reply delivery.
    pub sink: Arc<dyn ReplySink>,
    /// Header carrying the caller's chat user id.
    pub identity_header: HeaderName,
    /// Command replies still being produced; drained on shutdown.
    pub tasks: TaskTracker,
}

impl AppState {
    /// Build the production state: in-memory store, reqwest clients.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let http = build_http_client(&config)?;
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let sink: Arc<dyn ReplySink> = Arc::new(ResponseUrlSink::new(http.clone()));
        Self::builder(config).http(http).store(store).sink(sink).build()
    }

    /// Start assembling state from its parts.
    pub fn builder(config: BridgeConfig) -> AppStateBuilder {
        AppStateBuilder {
            config,
            http: None,
            store: None,
            sink: None,
            factory: None,
        }
    }
}

/// Assembles an [`AppState`], letting tests swap collaborators.
pub struct AppStateBuilder {
    config: BridgeConfig,
    http: Option<reqwest::Client>,
    store: Option<Arc<dyn CredentialStore>>,
    sink: Option<Arc<dyn ReplySink>>,
    factory: Option<Arc<dyn TicketServiceFactory>>,
}

impl AppStateBuilder {
    pub fn http(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ReplySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn TicketServiceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validate the config and wire everything together.
    pub fn build(self) -> Result<AppState, BridgeError> {
        let config = self.config;
        config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => build_http_client(&config)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>);
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(ResponseUrlSink::new(http.clone())) as Arc<dyn ReplySink>);

        let factory: Arc<dyn TicketServiceFactory> = match self.factory {
            Some(factory) => factory,
            None => {
                let api_root = config
                    .zendesk
                    .api_url
                    .as_deref()
                    .map(Url::parse)
                    .transpose()
                    .map_err(|e| ConfigError::Invalid(format!("zendesk.api_url: {}", e)))?;
                Arc::new(
                    ZendeskClientFactory::new(http.clone())
                        .with_api_root(api_root)
                        .with_retry(config.retry_policy()),
                )
            }
        };

        let mut resolver = CredentialResolver::new(Arc::clone(&store), &config.zendesk.url);
        if let Some(shared) = config.shared_credential() {
            info!("Service account fallback enabled for read commands");
            resolver = resolver.with_shared_credential(shared);
        }

        let oauth = OAuthFlow::new(
            OAuthSettings::from_config(&config)?,
            http,
            Arc::clone(&store),
        );

        let handlers = CommandHandlers::new(
            resolver,
            factory,
            oauth.clone(),
            config.trigger.clone(),
            config.public_base(),
        );
        let dispatcher = Dispatcher::new(Verb::table()?, handlers);

        let identity_header = HeaderName::from_bytes(config.identity_header.as_bytes())
            .map_err(|_| {
                ConfigError::Invalid(format!(
                    "identity_header `{}` is not a valid header name",
                    config.identity_header
                ))
            })?;

        Ok(AppState {
            config: Arc::new(config),
            dispatcher,
            oauth,
            sink,
            identity_header,
            tasks: TaskTracker::new(),
        })
    }
}

fn build_http_client(config: &BridgeConfig) -> Result<reqwest::Client, BridgeError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| BridgeError::HttpClient(e.to_string()))
}
