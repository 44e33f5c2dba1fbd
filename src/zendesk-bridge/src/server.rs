//! HTTP surface: slash command webhook, OAuth routes, liveness check.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::Invocation;
use crate::handlers::CONNECT_PATH;
use crate::oauth::{CallbackParams, OAuthError, REDIRECT_PATH, callback_page};
use crate::state::AppState;

/// Alternate callback path accepted for older app registrations.
pub const COMPLETE_PATH: &str = "/oauth/complete";

/// Slash command webhook payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandForm {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl CommandForm {
    /// Full command line. Chat servers send the trigger and the text
    /// separately; older ones send the whole line in `text`.
    fn command_line(&self) -> String {
        let text = self.text.trim();
        if self.command.is_empty() || text.starts_with(self.command.as_str()) {
            text.to_string()
        } else {
            format!("{} {}", self.command, text)
        }
    }
}

/// Run the server until `shutdown` resolves.
pub async fn run_with_shutdown<F>(config: BridgeConfig, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config.listen_addr.parse()?;
    let state = AppState::new(config)?;

    info!("Starting Zendesk bridge on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}

/// Serve on `listener` until `shutdown` resolves, then wait for command
/// replies that are still being produced.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let tasks = state.tasks.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tasks.close();
    if !tasks.is_empty() {
        info!(pending = tasks.len(), "Waiting for in-flight command replies");
    }
    tasks.wait().await;

    Ok(())
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/command", post(command))
        .route(CONNECT_PATH, get(connect))
        .route(REDIRECT_PATH, get(callback_query).post(callback_form))
        .route(COMPLETE_PATH, get(callback_query).post(callback_form))
        .route("/test", get(liveness))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn liveness() -> &'static str {
    "Hello, world!"
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Acknowledge the webhook at once; the reply goes through the sink.
async fn command(State(state): State<Arc<AppState>>, Form(form): Form<CommandForm>) -> Response {
    // Unset only when `allow_unauthenticated_commands` was chosen.
    if let Some(expected) = &state.config.command_token {
        if !token_matches(expected, form.token.as_deref().unwrap_or_default()) {
            warn!(user_id = %form.user_id, "Rejected slash command with bad token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let invocation = Invocation {
        text: form.command_line(),
        user_id: form.user_id,
        channel_id: form.channel_id,
        response_url: form.response_url,
    };

    let tasks = state.tasks.clone();
    tasks.spawn(async move {
        let reply = state.dispatcher.dispatch(&invocation).await;
        if let Err(e) = state.sink.post_ephemeral(&invocation.target(), &reply).await {
            warn!(user_id = %invocation.user_id, "Failed to deliver reply: {}", e);
        }
    });

    Json(serde_json::json!({})).into_response()
}

/// Constant-time comparison of the configured and presented command tokens.
fn token_matches(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.len() != provided.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    expected.ct_eq(provided).into()
}

fn caller_identity<'a>(state: &AppState, headers: &'a HeaderMap) -> Option<&'a str> {
    headers
        .get(&state.identity_header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Send the browser to the provider's authorization page.
async fn connect(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(user_id) = caller_identity(&state, &headers) else {
        warn!("Connect request without caller identity");
        return (StatusCode::UNAUTHORIZED, "Not authorized").into_response();
    };

    let url = state.oauth.authorization_url();
    debug!(user_id, "Redirecting to Zendesk authorization page");
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

async fn callback_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Html<String> {
    let params = query
        .map(|Query(params)| params)
        .map_err(|e| OAuthError::Malformed(e.body_text()));
    finish_callback(&state, &headers, params).await
}

async fn callback_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<CallbackParams>, QueryRejection>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Html<String> {
    // Providers may put the code in the query string even on POST.
    let params = match (form, query) {
        (Ok(Form(form)), Ok(Query(query))) => Ok(CallbackParams {
            code: form.code.or(query.code),
            error: form.error.or(query.error),
            error_description: form.error_description.or(query.error_description),
        }),
        (Ok(Form(form)), Err(_)) => Ok(form),
        (Err(e), _) => Err(OAuthError::Malformed(e.body_text())),
    };
    finish_callback(&state, &headers, params).await
}

async fn finish_callback(
    state: &AppState,
    headers: &HeaderMap,
    params: Result<CallbackParams, OAuthError>,
) -> Html<String> {
    let outcome = match params {
        Ok(params) => {
            state
                .oauth
                .complete(caller_identity(state, headers), params)
                .await
        }
        Err(e) => {
            warn!("Malformed OAuth callback: {}", e);
            Err(e)
        }
    };
    Html(callback_page(&outcome))
}
