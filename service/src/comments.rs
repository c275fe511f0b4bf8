//! Comments on tickets.

use helpdesk_core::environment::{Clock, RequestContext};
use helpdesk_core::error::{Component, Entity, Error};
use helpdesk_core::input::{CreateCommentInput, UpdateCommentInput};
use helpdesk_core::repository::CommentRepository;
use helpdesk_core::store::TicketStore;
use helpdesk_core::types::{Comment, CommentId, NewComment, TicketId};
use helpdesk_core::validation::Validator;
use std::sync::Arc;
use std::time::Duration;

/// Posts, edits and removes comments.
///
/// Only the author of a comment may edit or delete it. Deleted comments
/// behave as if they never existed.
#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    tickets: Arc<dyn TicketStore>,
    validator: Arc<dyn Validator>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl CommentService {
    /// Create a comment service.
    #[must_use]
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        tickets: Arc<dyn TicketStore>,
        validator: Arc<dyn Validator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            comments,
            tickets,
            validator,
            clock,
            timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-step timeout used when a request has no deadline.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Comments of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// [`Error::TransientIo`] if the store is unreachable.
    pub async fn list(&self, ctx: &RequestContext, ticket_id: TicketId) -> Result<Vec<Comment>, Error> {
        ctx.bounded(Component::Store, self.timeout, async {
            self.comments
                .list_by_ticket(ticket_id)
                .await
                .map_err(Error::from)
        })
        .await
    }

    /// A live comment.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for a missing or deleted comment.
    pub async fn find_by_id(&self, ctx: &RequestContext, id: CommentId) -> Result<Comment, Error> {
        ctx.bounded(Component::Store, self.timeout, async {
            self.comments
                .find(id)
                .await?
                .ok_or(Error::NotFound {
                    entity: Entity::Comment,
                    id: id.get(),
                })
        })
        .await
    }

    /// Post a comment as the acting user.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty body, [`Error::NotFound`] when the
    /// ticket does not exist.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: CreateCommentInput,
    ) -> Result<Comment, Error> {
        self.validator.validate_create_comment(&input)?;

        ctx.bounded(
            Component::Store,
            self.timeout,
            self.tickets.find_by_id(input.ticket_id),
        )
        .await?;

        let comment = NewComment {
            ticket_id: input.ticket_id,
            user_id: ctx.acting_user(),
            content: input.content,
            created_at: self.clock.now(),
        };
        let created = ctx
            .bounded(Component::Store, self.timeout, async {
                self.comments.insert(comment).await.map_err(Error::from)
            })
            .await?;

        tracing::info!(comment_id = %created.id, ticket_id = %created.ticket_id, "Comment posted");
        Ok(created)
    }

    /// Replace the body of one of the acting user's comments.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for a missing or deleted comment,
    /// [`Error::Authorization`] when the acting user is not the author.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: CommentId,
        input: UpdateCommentInput,
    ) -> Result<Comment, Error> {
        self.validator.validate_update_comment(&input)?;
        self.owned(ctx, id).await?;

        let now = self.clock.now();
        let updated = ctx
            .bounded(Component::Store, self.timeout, async {
                self.comments
                    .update_content(id, &input.content, now)
                    .await
                    .map_err(Error::from)
            })
            .await?;

        tracing::info!(comment_id = %id, "Comment updated");
        Ok(updated)
    }

    /// Delete one of the acting user's comments.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for a missing or deleted comment,
    /// [`Error::Authorization`] when the acting user is not the author.
    pub async fn delete(&self, ctx: &RequestContext, id: CommentId) -> Result<(), Error> {
        self.owned(ctx, id).await?;

        let now = self.clock.now();
        ctx.bounded(Component::Store, self.timeout, async {
            self.comments.soft_delete(id, now).await.map_err(Error::from)
        })
        .await?;

        tracing::info!(comment_id = %id, "Comment deleted");
        Ok(())
    }

    async fn owned(&self, ctx: &RequestContext, id: CommentId) -> Result<Comment, Error> {
        let comment = self.find_by_id(ctx, id).await?;
        if comment.user_id != ctx.acting_user() {
            tracing::warn!(
                comment_id = %id,
                author = %comment.user_id,
                user_id = %ctx.acting_user(),
                "Rejected change to someone else's comment"
            );
            return Err(Error::Authorization(format!(
                "comment {id} belongs to another user"
            )));
        }
        Ok(comment)
    }
}
