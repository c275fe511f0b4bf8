//! Users, sessions, comments and attachments held in memory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helpdesk_core::error::{Entity, StoreError};
use helpdesk_core::repository::{
    AttachmentRepository, CommentRepository, SessionStore, UserDirectory,
};
use helpdesk_core::types::{
    Attachment, AttachmentId, Comment, CommentId, NewAttachment, NewComment, TicketId, User,
    UserId, UserSession,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// [`UserDirectory`] and [`SessionStore`] over hash maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<Mutex<HashMap<UserId, User>>>,
    sessions: Arc<Mutex<HashMap<String, UserSession>>>,
}

impl InMemoryUserDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a derived email address.
    pub fn add_user(&self, id: i64, name: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: UserId::new(id),
            name: name.to_string(),
            email: format!("{}@helpdesk.test", name.to_lowercase()),
            role: "agent".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }

    /// Register a session.
    pub fn add_session(&self, user_id: UserId, token: &str, expires_at: DateTime<Utc>) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = UserSession {
            id: i64::try_from(sessions.len()).unwrap_or(i64::MAX) + 1,
            user_id,
            token: token.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        sessions.insert(token.to_string(), session);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }
}

#[async_trait]
impl SessionStore for InMemoryUserDirectory {
    async fn find_active(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .get(token)
            .filter(|s| s.expires_at > now)
            .cloned())
    }
}

/// [`CommentRepository`] over a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommentRepository {
    rows: Arc<Mutex<BTreeMap<i64, Comment>>>,
}

impl InMemoryCommentRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw row, including soft-deleted ones.
    #[must_use]
    pub fn row(&self, id: CommentId) -> Option<Comment> {
        self.rows.lock().unwrap().get(&id.get()).cloned()
    }
}

fn comment_missing(id: CommentId) -> StoreError {
    StoreError::NotFound {
        entity: Entity::Comment,
        id: id.get(),
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn list_by_ticket(&self, ticket_id: TicketId) -> Result<Vec<Comment>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.ticket_id == ticket_id && c.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn find(&self, id: CommentId) -> Result<Option<Comment>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id.get())
            .filter(|c| c.deleted_at.is_none())
            .cloned())
    }

    async fn insert(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        let row = Comment {
            id: CommentId::new(id),
            ticket_id: comment.ticket_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at: comment.created_at,
            updated_at: comment.created_at,
            deleted_at: None,
        };
        rows.insert(id, row.clone());
        Ok(row)
    }

    async fn update_content(
        &self,
        id: CommentId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Comment, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&id.get())
            .filter(|c| c.deleted_at.is_none())
            .ok_or_else(|| comment_missing(id))?;
        row.content = content.to_string();
        row.updated_at = at;
        Ok(row.clone())
    }

    async fn soft_delete(&self, id: CommentId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&id.get())
            .filter(|c| c.deleted_at.is_none())
            .ok_or_else(|| comment_missing(id))?;
        row.deleted_at = Some(at);
        Ok(())
    }
}

/// Append-only [`AttachmentRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttachmentRepository {
    rows: Arc<Mutex<Vec<Attachment>>>,
}

impl InMemoryAttachmentRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttachmentRepository for InMemoryAttachmentRepository {
    async fn list_by_ticket(&self, ticket_id: TicketId) -> Result<Vec<Attachment>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, attachment: NewAttachment) -> Result<Attachment, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = Attachment {
            id: AttachmentId::new(i64::try_from(rows.len()).unwrap_or(i64::MAX) + 1),
            ticket_id: attachment.ticket_id,
            file_path: attachment.file_path,
            uploaded_at: attachment.uploaded_at,
        };
        rows.push(row.clone());
        Ok(row)
    }
}
