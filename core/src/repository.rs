//! Durable-store capabilities outside the ticket pipeline.

use crate::error::StoreError;
use crate::types::{
    Attachment, Comment, CommentId, NewAttachment, NewComment, TicketId, User, UserId, UserSession,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read-only user lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// A live user by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
}

/// Session lookup.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The session for `token` if it expires after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn find_active(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError>;
}

/// Comment rows. Reads exclude soft-deleted comments.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Comments of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn list_by_ticket(&self, ticket_id: TicketId) -> Result<Vec<Comment>, StoreError>;

    /// A live comment by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn find(&self, id: CommentId) -> Result<Option<Comment>, StoreError>;

    /// Insert a comment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn insert(&self, comment: NewComment) -> Result<Comment, StoreError>;

    /// Replace a comment's body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the comment is missing or deleted.
    async fn update_content(
        &self,
        id: CommentId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Comment, StoreError>;

    /// Mark a comment deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the comment is missing or deleted.
    async fn soft_delete(&self, id: CommentId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Attachment rows. Append-only.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Attachments of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn list_by_ticket(&self, ticket_id: TicketId) -> Result<Vec<Attachment>, StoreError>;

    /// Insert an attachment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn insert(&self, attachment: NewAttachment) -> Result<Attachment, StoreError>;
}
