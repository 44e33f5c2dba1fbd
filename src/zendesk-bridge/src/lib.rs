//! Zendesk bridge - slash commands for Zendesk tickets.
//!
//! This crate provides:
//! - Command parsing and longest-prefix verb routing
//! - Per-invocation credential resolution (service account or per-user OAuth token)
//! - The OAuth authorization-code flow that links chat users to Zendesk
//! - Command handlers for ticket status, details, comments and updates
//! - An axum HTTP surface for the slash command webhook and OAuth callbacks
//!
//! Tokens live in process memory only; restarting the bridge disconnects
//! every user.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod handlers;
pub mod messages;
pub mod oauth;
pub mod parser;
pub mod router;
pub mod server;
pub mod sink;
pub mod state;
pub mod verbs;

pub use config::BridgeConfig;
pub use dispatch::{Dispatcher, Invocation};
pub use error::{BridgeError, CommandError, ConfigError};
pub use messages::Reply;
pub use server::{create_router, run_with_shutdown, serve};
pub use state::AppState;

/// Run the server until the process is stopped.
pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    run_with_shutdown(config, std::future::pending()).await
}
