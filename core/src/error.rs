//! Error types.
//!
//! Every operation of the helpdesk core returns [`Error`]. Adapters for the
//! durable store, the cache, the broker, the mail relay and the search index
//! report their own error enums which convert into [`Error`] at the seam.

use crate::types::TicketId;
use std::fmt;
use thiserror::Error;

/// Coarse classification callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input rejected before any side effect.
    Validation,
    /// The entity does not exist (or was soft-deleted).
    NotFound,
    /// The caller may not perform the operation.
    Authorization,
    /// Optimistic concurrency check failed.
    Conflict,
    /// A backend was unreachable or timed out. Safe to retry.
    TransientIo,
    /// The ticket mutation committed but a later step did not.
    ConsistencyGap,
}

/// Kind of entity an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    /// A ticket.
    Ticket,
    /// A comment.
    Comment,
    /// An attachment.
    Attachment,
    /// A user.
    User,
    /// A session.
    Session,
    /// A notification or dead-lettered notification.
    Notification,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ticket => "ticket",
            Self::Comment => "comment",
            Self::Attachment => "attachment",
            Self::User => "user",
            Self::Session => "session",
            Self::Notification => "notification",
        })
    }
}

/// Backend a transient failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    /// Relational store.
    Store,
    /// Key-value cache.
    Cache,
    /// Message broker.
    Broker,
    /// SMTP relay.
    Mail,
    /// Full-text search index.
    SearchIndex,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Store => "store",
            Self::Cache => "cache",
            Self::Broker => "broker",
            Self::Mail => "mail relay",
            Self::SearchIndex => "search index",
        })
    }
}

/// Follow-up step of a ticket mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationStep {
    /// Appending the audit ledger row.
    HistoryRecord,
    /// Publishing the assignee notification.
    NotificationDispatch,
}

impl MutationStep {
    /// Metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HistoryRecord => "history_record",
            Self::NotificationDispatch => "notification_dispatch",
        }
    }
}

impl fmt::Display for MutationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HistoryRecord => "history record",
            Self::NotificationDispatch => "notification dispatch",
        })
    }
}

/// A single rejected input field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    /// Field name as submitted.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl FieldViolation {
    /// Create a violation.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error returned by helpdesk operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Input failed validation. No side effects happened.
    #[error("Validation failed: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    /// Entity missing or soft-deleted.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity.
        entity: Entity,
        /// Raw identifier that was looked up.
        id: i64,
    },

    /// Caller is not allowed to do this.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// The stored ticket moved on since the caller read it.
    #[error("Ticket {ticket_id} was modified concurrently (expected version {expected})")]
    Conflict {
        /// Ticket being updated.
        ticket_id: TicketId,
        /// Version the caller based its update on.
        expected: i64,
    },

    /// A backend failed or timed out.
    #[error("{component} unavailable: {reason}")]
    TransientIo {
        /// Failing backend.
        component: Component,
        /// Underlying cause.
        reason: String,
    },

    /// The ticket row committed but a follow-up step failed.
    #[error("Ticket {ticket_id} committed but {step} failed: {reason}")]
    ConsistencyGap {
        /// Ticket whose mutation is durable.
        ticket_id: TicketId,
        /// Step that did not complete.
        step: MutationStep,
        /// Underlying cause.
        reason: String,
    },
}

impl Error {
    /// Shorthand for a single-field validation error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Shorthand for a transient failure.
    #[must_use]
    pub fn transient(component: Component, reason: impl Into<String>) -> Self {
        Self::TransientIo {
            component,
            reason: reason.into(),
        }
    }

    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::TransientIo { .. } => ErrorKind::TransientIo,
            Self::ConsistencyGap { .. } => ErrorKind::ConsistencyGap,
        }
    }

    /// Whether repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }
}

/// Errors reported by relational store adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No live row with that identifier.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity.
        entity: Entity,
        /// Raw identifier.
        id: i64,
    },

    /// Version check on update failed.
    #[error("Version conflict on ticket {ticket_id} (expected {expected})")]
    Conflict {
        /// Ticket being updated.
        ticket_id: TicketId,
        /// Version the caller expected.
        expected: i64,
    },

    /// Driver or connection failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict { ticket_id, expected } => Self::Conflict { ticket_id, expected },
            StoreError::Database(reason) => Self::transient(Component::Store, reason),
        }
    }
}

/// Errors reported by cache adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Could not reach the cache.
    #[error("Cache connection failed: {0}")]
    Connection(String),

    /// The cache rejected a command.
    #[error("Cache command failed: {0}")]
    Command(String),
}

impl From<CacheError> for Error {
    fn from(error: CacheError) -> Self {
        Self::transient(Component::Cache, error.to_string())
    }
}

/// Errors reported by message broker adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Could not connect to the broker.
    #[error("Broker connection failed: {0}")]
    ConnectionFailed(String),

    /// Publishing was not confirmed.
    #[error("Failed to publish to {exchange}: {reason}")]
    PublishFailed {
        /// Target exchange.
        exchange: String,
        /// Underlying cause.
        reason: String,
    },

    /// Subscribing to a queue failed.
    #[error("Failed to consume from {queue}: {reason}")]
    ConsumeFailed {
        /// Queue name.
        queue: String,
        /// Underlying cause.
        reason: String,
    },

    /// The exchange, queue or binding could not be declared.
    #[error("Failed to declare {exchange}: {reason}")]
    DeclareFailed {
        /// Exchange being declared.
        exchange: String,
        /// Underlying cause.
        reason: String,
    },

    /// Acknowledging a delivery failed.
    #[error("Failed to acknowledge delivery: {0}")]
    AckFailed(String),

    /// A message could not be encoded or decoded.
    #[error("Message serialization failed: {0}")]
    Serialization(String),

    /// Generic transport failure.
    #[error("Broker transport error: {0}")]
    Transport(String),
}

impl From<BrokerError> for Error {
    fn from(error: BrokerError) -> Self {
        Self::transient(Component::Broker, error.to_string())
    }
}

/// Errors reported by mailers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// The message could not be built (bad address, empty body...).
    #[error("Invalid email: {0}")]
    InvalidMessage(String),

    /// The relay refused or could not be reached.
    #[error("SMTP delivery failed: {0}")]
    Delivery(String),
}

impl MailError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }
}

impl From<MailError> for Error {
    fn from(error: MailError) -> Self {
        match error {
            MailError::InvalidMessage(reason) => Self::invalid("email", reason),
            MailError::Delivery(reason) => Self::transient(Component::Mail, reason),
        }
    }
}

/// Errors reported by the search index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Search index error: {0}")]
pub struct IndexError(pub String);

impl From<IndexError> for Error {
    fn from(error: IndexError) -> Self {
        Self::transient(Component::SearchIndex, error.0)
    }
}

/// Result alias for helpdesk operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_kinds() {
        let not_found: Error = StoreError::NotFound {
            entity: Entity::Ticket,
            id: 4,
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.to_string(), "ticket 4 not found");

        let conflict: Error = StoreError::Conflict {
            ticket_id: TicketId::new(4),
            expected: 2,
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let db: Error = StoreError::Database("connection reset".to_string()).into();
        assert!(db.is_retryable());
    }

    #[test]
    fn validation_message_lists_every_field() {
        let error = Error::Validation(vec![
            FieldViolation::new("title", "is required"),
            FieldViolation::new("priority", "is required"),
        ]);
        assert_eq!(
            error.to_string(),
            "Validation failed: title: is required, priority: is required"
        );
        assert!(!error.is_retryable());
    }

    #[test]
    fn consistency_gap_is_not_retryable() {
        let error = Error::ConsistencyGap {
            ticket_id: TicketId::new(9),
            step: MutationStep::HistoryRecord,
            reason: "index down".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::ConsistencyGap);
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("history record"));
    }
}
