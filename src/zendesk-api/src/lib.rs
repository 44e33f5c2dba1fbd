//! Zendesk REST client for the chat command bridge.
//!
//! This crate provides the helpdesk side of the integration:
//! - Ticket, user, organization and comment types
//! - The [`TicketService`] trait consumed by the command handlers
//! - [`ZendeskClient`], a reqwest implementation with bounded retries
//! - Service URL normalization and API host derivation
//!
//! # Example
//!
//! ```rust,ignore
//! use zendesk_api::{ApiHost, Credential, TicketService, ZendeskClient};
//!
//! let host = ApiHost::from_service_url("https://acme.zendesk.com")?;
//! let client = ZendeskClient::for_host(reqwest::Client::new(), &host, Credential::bearer(token))?;
//! let view = client.fetch_ticket(42).await?;
//! ```

pub mod client;
pub mod credential;
pub mod error;
pub mod host;
pub mod retry;
pub mod types;

pub use client::{TicketService, ZendeskClient};
pub use credential::Credential;
pub use error::{ApiError, ApiResult};
pub use host::{ApiHost, ServiceUrl};
pub use retry::{Idempotency, RetryPolicy};
pub use types::{
    Comment, CommentInput, Organization, Ticket, TicketId, TicketUpdate, TicketView, User,
    Visibility,
};
