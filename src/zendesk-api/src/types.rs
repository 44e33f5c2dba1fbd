//! Zendesk resources, reduced to the fields the bridge reads or writes.

use serde::{Deserialize, Serialize};

/// Ticket identifier.
pub type TicketId = u64;

/// A support ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket number.
    pub id: TicketId,
    /// Subject line.
    #[serde(default)]
    pub subject: Option<String>,
    /// First comment of the ticket.
    #[serde(default)]
    pub description: Option<String>,
    /// new, open, pending, hold, solved or closed.
    #[serde(default)]
    pub status: Option<String>,
    /// low, normal, high or urgent.
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub requester_id: Option<u64>,
    #[serde(default)]
    pub assignee_id: Option<u64>,
    #[serde(default)]
    pub organization_id: Option<u64>,
}

/// A Zendesk user, as sideloaded with tickets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// An organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// A comment on a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    /// Public comments are visible to the requester, private ones to agents only.
    #[serde(default = "default_public")]
    pub public: bool,
    #[serde(default)]
    pub author_id: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_public() -> bool {
    true
}

impl Comment {
    /// Visibility of this comment.
    pub fn visibility(&self) -> Visibility {
        Visibility::from_public_flag(self.public)
    }
}

/// Comment visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Internal note, agents only.
    Private,
    /// Visible to the requester.
    Public,
}

impl Visibility {
    /// Map Zendesk's `public` flag.
    pub fn from_public_flag(public: bool) -> Self {
        if public {
            Self::Public
        } else {
            Self::Private
        }
    }

    /// Zendesk's `public` flag for this visibility.
    pub fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }

    /// Lowercase name, as used in command verbs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// A ticket together with the users sideloaded alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TicketView {
    pub ticket: Ticket,
    #[serde(default)]
    pub users: Vec<User>,
}

impl TicketView {
    fn user(&self, id: Option<u64>) -> Option<&User> {
        let id = id?;
        self.users.iter().find(|u| u.id == id)
    }

    /// The requester, when sideloaded.
    pub fn requester(&self) -> Option<&User> {
        self.user(self.ticket.requester_id)
    }

    /// The assignee, when sideloaded.
    pub fn assignee(&self) -> Option<&User> {
        self.user(self.ticket.assignee_id)
    }
}

/// New comment attached to a ticket update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentInput {
    pub body: String,
    pub public: bool,
}

/// Partial ticket update; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentInput>,
}

impl TicketUpdate {
    /// Update that only adds a comment.
    pub fn comment(body: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            comment: Some(CommentInput {
                body: body.into(),
                public: visibility.is_public(),
            }),
        }
    }
}

// Wire envelopes.

#[derive(Debug, Deserialize)]
pub(crate) struct TicketEnvelope {
    pub ticket: Ticket,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrganizationEnvelope {
    pub organization: Organization,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentPage {
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub next_page: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TicketUpdateEnvelope<'a> {
    pub ticket: &'a TicketUpdate,
}
