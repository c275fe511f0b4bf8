//! Users, sessions, comments and attachments.

use crate::database_error;
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
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// `PostgreSQL` [`UserDirectory`] and [`SessionStore`].
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    /// Directory on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, role, created_at, updated_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(|row| -> Result<User, sqlx::Error> {
            Ok(User {
                id: UserId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                role: row.try_get("role")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
        .map_err(database_error)
    }
}

#[async_trait]
impl SessionStore for PostgresUserDirectory {
    async fn find_active(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, token, expires_at, created_at
            FROM user_sessions
            WHERE token = $1 AND expires_at > $2
            ",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(|row| -> Result<UserSession, sqlx::Error> {
            Ok(UserSession {
                id: row.try_get("id")?,
                user_id: UserId::new(row.try_get("user_id")?),
                token: row.try_get("token")?,
                expires_at: row.try_get("expires_at")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
        .map_err(database_error)
    }
}

/// `PostgreSQL` [`CommentRepository`].
#[derive(Clone)]
pub struct PostgresCommentRepository {
    pool: PgPool,
}

const COMMENT_COLUMNS: &str = "id, ticket_id, user_id, content, created_at, updated_at, deleted_at";

impl PostgresCommentRepository {
    /// Repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_comment(row: &PgRow) -> Result<Comment, StoreError> {
        let read = || -> Result<Comment, sqlx::Error> {
            Ok(Comment {
                id: CommentId::new(row.try_get("id")?),
                ticket_id: TicketId::new(row.try_get("ticket_id")?),
                user_id: UserId::new(row.try_get("user_id")?),
                content: row.try_get("content")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                deleted_at: row.try_get("deleted_at")?,
            })
        };
        read().map_err(database_error)
    }
}

fn comment_missing(id: CommentId) -> StoreError {
    StoreError::NotFound {
        entity: Entity::Comment,
        id: id.get(),
    }
}

#[async_trait]
impl CommentRepository for PostgresCommentRepository {
    async fn list_by_ticket(&self, ticket_id: TicketId) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE ticket_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(ticket_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter().map(Self::row_to_comment).collect()
    }

    async fn find(&self, id: CommentId) -> Result<Option<Comment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.as_ref().map(Self::row_to_comment).transpose()
    }

    async fn insert(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments (ticket_id, user_id, content, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(comment.ticket_id.get())
        .bind(comment.user_id.get())
        .bind(&comment.content)
        .bind(comment.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        Self::row_to_comment(&row)
    }

    async fn update_content(
        &self,
        id: CommentId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Comment, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE comments SET content = $2, updated_at = $3 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id.get())
        .bind(content)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?
        .ok_or_else(|| comment_missing(id))?;

        Self::row_to_comment(&row)
    }

    async fn soft_delete(&self, id: CommentId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE comments SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.get())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(comment_missing(id));
        }
        Ok(())
    }
}

/// `PostgreSQL` [`AttachmentRepository`].
#[derive(Clone)]
pub struct PostgresAttachmentRepository {
    pool: PgPool,
}

impl PostgresAttachmentRepository {
    /// Repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_attachment(row: &PgRow) -> Result<Attachment, StoreError> {
        let read = || -> Result<Attachment, sqlx::Error> {
            Ok(Attachment {
                id: AttachmentId::new(row.try_get("id")?),
                ticket_id: TicketId::new(row.try_get("ticket_id")?),
                file_path: row.try_get("file_path")?,
                uploaded_at: row.try_get("uploaded_at")?,
            })
        };
        read().map_err(database_error)
    }
}

#[async_trait]
impl AttachmentRepository for PostgresAttachmentRepository {
    async fn list_by_ticket(&self, ticket_id: TicketId) -> Result<Vec<Attachment>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, ticket_id, file_path, uploaded_at
            FROM attachments
            WHERE ticket_id = $1
            ORDER BY uploaded_at ASC, id ASC
            ",
        )
        .bind(ticket_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter().map(Self::row_to_attachment).collect()
    }

    async fn insert(&self, attachment: NewAttachment) -> Result<Attachment, StoreError> {
        let row = sqlx::query(
            r"
            INSERT INTO attachments (ticket_id, file_path, uploaded_at)
            VALUES ($1, $2, $3)
            RETURNING id, ticket_id, file_path, uploaded_at
            ",
        )
        .bind(attachment.ticket_id.get())
        .bind(&attachment.file_path)
        .bind(attachment.uploaded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        Self::row_to_attachment(&row)
    }
}
