//! Delivery of ephemeral replies to the invoking user.
//!
//! The chat server gives every slash command a `response_url`. Replies are
//! posted there after the webhook has already been acknowledged.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::messages::{Attachment, Reply};

/// Delivery failure.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The invocation carried no callback URL.
    #[error("no response_url for this invocation")]
    NoResponseUrl,

    /// The chat server rejected the reply.
    #[error("reply rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Transport failure.
    #[error("reply delivery failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Where a reply goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyTarget {
    pub user_id: String,
    pub channel_id: String,
    pub response_url: Option<String>,
}

/// Something that can show a reply to exactly one user.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Post `reply` so that only the target user sees it.
    async fn post_ephemeral(&self, target: &ReplyTarget, reply: &Reply) -> Result<(), SinkError>;
}

#[derive(Debug, Serialize)]
struct EphemeralPayload<'a> {
    response_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [Attachment],
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

/// Posts replies to the invocation's `response_url`.
#[derive(Debug, Clone)]
pub struct ResponseUrlSink {
    http: reqwest::Client,
}

impl ResponseUrlSink {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReplySink for ResponseUrlSink {
    async fn post_ephemeral(&self, target: &ReplyTarget, reply: &Reply) -> Result<(), SinkError> {
        let Some(url) = target.response_url.as_deref().filter(|u| !u.is_empty()) else {
            warn!(user_id = %target.user_id, "Dropping reply: no response_url");
            return Err(SinkError::NoResponseUrl);
        };

        let payload = EphemeralPayload {
            response_type: "ephemeral",
            text: reply.text.as_deref(),
            attachments: &reply.attachments,
        };

        debug!(user_id = %target.user_id, channel_id = %target.channel_id, "Posting reply");
        let resp = self.http.post(url).json(&payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Chat server rejected reply: {}", body);
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
