//! Reply payloads and ticket formatting.

use serde::{Deserialize, Serialize};
use zendesk_api::{Organization, TicketView};

/// Accent color of ticket attachments.
pub const ATTACHMENT_COLOR: &str = "#95b7d0";

/// Longest description shown in a ticket attachment.
pub const MAX_DESCRIPTION_CHARS: usize = 3000;

/// A reply to the invoking user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Markdown text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Message attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Reply {
    /// A plain text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    /// A reply made of one attachment.
    pub fn attachment(attachment: Attachment) -> Self {
        Self {
            text: None,
            attachments: vec![attachment],
        }
    }

    /// The text, or an empty string.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// A message attachment (Slack/Mattermost format).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

/// A short titled value inside an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl AttachmentField {
    fn short(title: &str, value: &str) -> Self {
        Self {
            title: title.to_string(),
            value: value.to_string(),
            short: true,
        }
    }
}

/// Link to a ticket in the agent interface.
pub fn ticket_url(service_origin: &str, ticket_id: u64) -> String {
    format!(
        "{}/agent/tickets/{}",
        service_origin.trim_end_matches('/'),
        ticket_id
    )
}

/// Render a ticket as an attachment.
///
/// Fields appear only when Zendesk returned a value for them.
pub fn ticket_attachment(
    view: &TicketView,
    organization: Option<&Organization>,
    service_origin: &str,
) -> Attachment {
    let ticket = &view.ticket;

    let mut text = format!(
        "[{}: {}]({})",
        ticket.id,
        ticket.subject.as_deref().unwrap_or_default(),
        ticket_url(service_origin, ticket.id)
    );
    let description = truncate(
        ticket.description.as_deref().unwrap_or_default(),
        MAX_DESCRIPTION_CHARS,
    );
    if !description.is_empty() {
        text.push_str("\n\n");
        text.push_str(&description);
        text.push('\n');
    }

    let mut fields = Vec::new();
    if let Some(status) = &ticket.status {
        fields.push(AttachmentField::short("Status", status));
    }
    if let Some(email) = view.assignee().and_then(|u| u.email.as_deref()) {
        fields.push(AttachmentField::short("Assignee", email));
    }
    if let Some(name) = view.requester().and_then(|u| u.name.as_deref()) {
        fields.push(AttachmentField::short("Requester", name));
    }
    if let Some(name) = organization.and_then(|o| o.name.as_deref()) {
        fields.push(AttachmentField::short("Organization", name));
    }
    if let Some(priority) = &ticket.priority {
        fields.push(AttachmentField::short("Priority", priority));
    }

    Attachment {
        color: Some(ATTACHMENT_COLOR.to_string()),
        text: Some(text),
        fields,
    }
}

/// Shorten `s` to at most `max` characters, ending in `...` when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max > 3 {
        let mut out: String = s.chars().take(max - 3).collect();
        out.push_str("...");
        out
    } else {
        s.chars().take(max).collect()
    }
}
