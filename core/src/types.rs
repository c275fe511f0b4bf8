//! Domain types for the helpdesk.
//!
//! Identifiers, entities and the small value objects (status, priority) that
//! flow between the ticket store, the audit ledger and the notification
//! pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the raw database identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of a ticket row.
    TicketId
);
row_id!(
    /// Identifier of a user row.
    UserId
);
row_id!(
    /// Identifier of a comment row.
    CommentId
);
row_id!(
    /// Identifier of an attachment row.
    AttachmentId
);
row_id!(
    /// Identifier of a persisted notification row.
    NotificationId
);
row_id!(
    /// Identifier of a ticket history row.
    HistoryId
);

// ============================================================================
// Priority
// ============================================================================

/// Ticket priority.
///
/// Parsing is case-insensitive. Values outside the known set are kept
/// verbatim in [`Priority::Other`] and get the default response window.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    /// Respond within 60 minutes.
    High,
    /// Respond within 90 minutes.
    Medium,
    /// Respond within 120 minutes.
    Low,
    /// Respond within 240 minutes.
    VeryLow,
    /// Any other value (90 minutes).
    Other(String),
}

impl Priority {
    /// Parse a priority, ignoring case for the known values.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "very_low" => Self::VeryLow,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Database / wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very_low",
            Self::Other(raw) => raw,
        }
    }

    /// How long a ticket of this priority may stay open before it is overdue.
    #[must_use]
    pub fn response_window(&self) -> Duration {
        match self {
            Self::High => Duration::minutes(60),
            Self::Low => Duration::minutes(120),
            Self::VeryLow => Duration::minutes(240),
            Self::Medium | Self::Other(_) => Duration::minutes(90),
        }
    }
}

impl From<String> for Priority {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Priority> for String {
    fn from(priority: Priority) -> Self {
        priority.as_str().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status
// ============================================================================

/// Ticket status.
///
/// The set is open: workflows may introduce statuses beyond the four known
/// ones, which are carried verbatim in [`TicketStatus::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketStatus {
    /// Newly raised, nobody working on it yet.
    Open,
    /// Someone is working on it.
    InProgress,
    /// A fix was provided.
    Resolved,
    /// Done.
    Closed,
    /// Any other workflow status.
    Other(String),
}

impl TicketStatus {
    /// Parse a status, ignoring case for the known values.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "open" => Self::Open,
            "in_progress" => Self::InProgress,
            "resolved" => Self::Resolved,
            "closed" => Self::Closed,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Database / wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Other(raw) => raw,
        }
    }

    /// Whether the ticket still counts against its due date.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

impl From<String> for TicketStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<TicketStatus> for String {
    fn from(status: TicketStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// A support ticket as stored in the durable store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Row identifier.
    pub id: TicketId,
    /// Short summary.
    pub title: String,
    /// Full description.
    pub description: String,
    /// Workflow status.
    pub status: TicketStatus,
    /// Priority, drives `due_by`.
    pub priority: Priority,
    /// Handler the ticket is assigned to.
    pub assigned_to: UserId,
    /// User who raised the ticket.
    pub user_id: UserId,
    /// Deadline derived from priority at the last mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_by: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped by every update.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Never serialized.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A ticket about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    /// Short summary.
    pub title: String,
    /// Full description.
    pub description: String,
    /// Initial status.
    pub status: TicketStatus,
    /// Initial priority.
    pub priority: Priority,
    /// Assigned handler.
    pub assigned_to: UserId,
    /// Acting user raising the ticket.
    pub user_id: UserId,
    /// Deadline computed from priority.
    pub due_by: DateTime<Utc>,
    /// Mutation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A partial update of an existing ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketChanges {
    /// Ticket to update.
    pub id: TicketId,
    /// New summary.
    pub title: String,
    /// New description.
    pub description: String,
    /// New status.
    pub status: TicketStatus,
    /// New priority.
    pub priority: Priority,
    /// New handler.
    pub assigned_to: UserId,
    /// Deadline recomputed from the new priority.
    pub due_by: DateTime<Utc>,
    /// Mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// When set, the update only applies if the stored version matches.
    pub expected_version: Option<i64>,
}

// ============================================================================
// Comments and attachments
// ============================================================================

/// A comment on a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Row identifier.
    pub id: CommentId,
    /// Ticket commented on.
    pub ticket_id: TicketId,
    /// Author. Only the author may change or delete the comment.
    pub user_id: UserId,
    /// Body.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Never serialized.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A comment about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewComment {
    /// Ticket commented on.
    pub ticket_id: TicketId,
    /// Author.
    pub user_id: UserId,
    /// Body.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A file attached to a ticket. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Row identifier.
    pub id: AttachmentId,
    /// Owning ticket.
    pub ticket_id: TicketId,
    /// Where the uploaded file lives.
    pub file_path: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
}

/// An attachment about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAttachment {
    /// Owning ticket.
    pub ticket_id: TicketId,
    /// Where the uploaded file lives.
    pub file_path: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
}

// ============================================================================
// Audit ledger
// ============================================================================

/// One row of the append-only audit ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketHistory {
    /// Row identifier.
    pub id: HistoryId,
    /// Ticket that was mutated.
    pub ticket_id: TicketId,
    /// Acting user.
    pub user_id: UserId,
    /// Status after the mutation.
    pub status: TicketStatus,
    /// Priority after the mutation.
    pub priority: Priority,
    /// When the mutation happened.
    pub changed_at: DateTime<Utc>,
}

/// A ledger row about to be appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewHistoryEntry {
    /// Ticket that was mutated.
    pub ticket_id: TicketId,
    /// Acting user.
    pub user_id: UserId,
    /// Status after the mutation.
    pub status: TicketStatus,
    /// Priority after the mutation.
    pub priority: Priority,
    /// When the mutation happened.
    pub changed_at: DateTime<Utc>,
}

// ============================================================================
// Notifications
// ============================================================================

/// Persistence-side status of a notification.
///
/// This only reflects what the dispatcher saw when it stored the row.
/// Delivery outcome is never written back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Published to the broker, delivery not yet known.
    Pending,
}

impl NotificationStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
        }
    }
}

/// A notification event, as published to the broker and stored locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Ticket the notification is about.
    pub ticket_id: TicketId,
    /// Recipient.
    pub user_id: UserId,
    /// Recipient address.
    pub email: String,
    /// Mail subject.
    pub subject: String,
    /// Mail body.
    pub message: String,
    /// Persistence-side status.
    pub status: NotificationStatus,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Users and sessions
// ============================================================================

/// A user, as needed by the core (no credentials).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Row identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address notifications go to.
    pub email: String,
    /// Role name.
    pub role: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An authenticated session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Row identifier.
    pub id: i64,
    /// Session owner.
    pub user_id: UserId,
    /// Bearer token.
    pub token: String,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
