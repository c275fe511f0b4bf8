//! Ticket lifecycle: every create, update and delete goes through here.
//!
//! ```text
//! validate ──▶ store write ──▶ history row ──▶ notification (create only)
//!               (commit)        └──── failure after commit: ConsistencyGap
//! ```
//!
//! Steps run in order, each bounded by the request deadline. Nothing is
//! rolled back: once the ticket row is written, a failing follow-up step
//! aborts the remaining ones and surfaces [`Error::ConsistencyGap`], so the
//! caller knows the ticket exists.

use helpdesk_core::environment::{Clock, RequestContext};
use helpdesk_core::error::{Component, Entity, Error, MutationStep};
use helpdesk_core::history::HistoryRecorder;
use helpdesk_core::input::{CreateTicketInput, TicketFilter, UpdateTicketInput};
use helpdesk_core::notification::NotificationDispatcher;
use helpdesk_core::overdue::{due_by_for, overdue_status};
use helpdesk_core::repository::{AttachmentRepository, CommentRepository, UserDirectory};
use helpdesk_core::store::TicketStore;
use helpdesk_core::types::{
    Attachment, Comment, NewHistoryEntry, NewTicket, Notification, NotificationStatus, Priority,
    Ticket, TicketChanges, TicketHistory, TicketId, TicketStatus, User, UserId,
};
use helpdesk_core::validation::Validator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Public part of a user shown next to a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// A ticket as shown to readers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketView {
    /// Stored ticket.
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Who raised it. `None` once that user was removed.
    pub creator: Option<UserSummary>,
    /// Comments, oldest first.
    pub comments: Vec<Comment>,
    /// Attachments, oldest first.
    pub attachments: Vec<Attachment>,
    /// Active and past due.
    pub penalty: bool,
    /// How late, empty unless `penalty`.
    pub overdue_by: String,
}

/// Everything [`TicketLifecycle`] talks to.
#[derive(Clone)]
pub struct LifecycleDependencies {
    /// Tickets with their cache.
    pub store: Arc<dyn TicketStore>,
    /// Audit ledger.
    pub history: Arc<dyn HistoryRecorder>,
    /// Assignee notifications.
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    /// Assignee and creator lookup.
    pub users: Arc<dyn UserDirectory>,
    /// Comments for the read view.
    pub comments: Arc<dyn CommentRepository>,
    /// Attachments for the read view.
    pub attachments: Arc<dyn AttachmentRepository>,
    /// Input rules.
    pub validator: Arc<dyn Validator>,
    /// Mutation timestamps and overdue checks.
    pub clock: Arc<dyn Clock>,
}

/// Orchestrates ticket mutations and builds the read view.
#[derive(Clone)]
pub struct TicketLifecycle {
    deps: LifecycleDependencies,
    timeout: Duration,
}

impl TicketLifecycle {
    /// Lifecycle with a 5 second per-step timeout for requests without a deadline.
    #[must_use]
    pub const fn new(deps: LifecycleDependencies) -> Self {
        Self {
            deps,
            timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-step timeout used when a request has no deadline.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Raise a ticket, record it and notify the assignee.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for rejected input,
    /// - [`Error::NotFound`] when the assignee does not exist,
    /// - [`Error::TransientIo`] when the ticket could not be written,
    /// - [`Error::ConsistencyGap`] when the ticket was written but the history
    ///   row or the notification was not.
    ///
    /// A `ConsistencyGap` always leaves a ticket behind. So can a
    /// `TransientIo` from the store write when the deadline expired after the
    /// row was committed; callers retrying such a create may duplicate it.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: CreateTicketInput,
    ) -> Result<Ticket, Error> {
        self.deps.validator.validate_create_ticket(&input)?;

        let assignee = self.user(ctx, input.assigned_to).await?.ok_or(Error::NotFound {
            entity: Entity::User,
            id: input.assigned_to.get(),
        })?;

        let now = self.deps.clock.now();
        let priority = Priority::parse(&input.priority);
        let new_ticket = NewTicket {
            title: input.title,
            description: input.description,
            status: TicketStatus::parse(&input.status),
            due_by: due_by_for(&priority, now),
            priority,
            assigned_to: assignee.id,
            user_id: ctx.acting_user(),
            created_at: now,
        };

        let ticket = ctx
            .bounded(Component::Store, self.timeout, self.deps.store.create(new_ticket))
            .await?;

        self.record(ctx, &ticket).await?;

        let notification = Notification {
            ticket_id: ticket.id,
            user_id: assignee.id,
            email: assignee.email,
            subject: ticket.title.clone(),
            message: ticket.description.clone(),
            status: NotificationStatus::Pending,
            created_at: now,
        };
        ctx.bounded(
            Component::Broker,
            self.timeout,
            self.deps.dispatcher.dispatch(notification),
        )
        .await
        .map_err(|e| consistency_gap(ticket.id, MutationStep::NotificationDispatch, &e))?;

        metrics::counter!("helpdesk_tickets_mutations_total", "op" => "create").increment(1);
        tracing::info!(
            ticket_id = %ticket.id,
            assigned_to = %ticket.assigned_to,
            user_id = %ctx.acting_user(),
            "Ticket created"
        );
        Ok(ticket)
    }

    /// Apply an update and record it.
    ///
    /// The due date is recomputed from the new priority. The creator is never
    /// changed; the acting user only appears in the history row.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for rejected input,
    /// - [`Error::NotFound`] for a missing or deleted ticket, or when the new
    ///   assignee does not exist,
    /// - [`Error::Conflict`] when `expected_version` is stale,
    /// - [`Error::ConsistencyGap`] when the update was written but the history
    ///   row was not.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        input: UpdateTicketInput,
    ) -> Result<Ticket, Error> {
        self.deps.validator.validate_update_ticket(&input)?;

        let assignee = self.user(ctx, input.assigned_to).await?.ok_or(Error::NotFound {
            entity: Entity::User,
            id: input.assigned_to.get(),
        })?;

        let now = self.deps.clock.now();
        let priority = Priority::parse(&input.priority);
        let changes = TicketChanges {
            id,
            title: input.title,
            description: input.description,
            status: TicketStatus::parse(&input.status),
            due_by: due_by_for(&priority, now),
            priority,
            assigned_to: assignee.id,
            updated_at: now,
            expected_version: input.expected_version,
        };

        let ticket = ctx
            .bounded(Component::Store, self.timeout, self.deps.store.update(changes))
            .await?;

        self.record(ctx, &ticket).await?;

        metrics::counter!("helpdesk_tickets_mutations_total", "op" => "update").increment(1);
        tracing::info!(
            ticket_id = %ticket.id,
            version = ticket.version,
            user_id = %ctx.acting_user(),
            "Ticket updated"
        );
        Ok(ticket)
    }

    /// Soft-delete a ticket and record its last state.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for a missing or already deleted ticket,
    /// [`Error::ConsistencyGap`] when the history row could not be written.
    pub async fn delete(&self, ctx: &RequestContext, id: TicketId) -> Result<(), Error> {
        let now = self.deps.clock.now();
        let ticket = ctx
            .bounded(Component::Store, self.timeout, self.deps.store.delete(id, now))
            .await?;

        self.record(ctx, &ticket).await?;

        metrics::counter!("helpdesk_tickets_mutations_total", "op" => "delete").increment(1);
        tracing::info!(ticket_id = %id, user_id = %ctx.acting_user(), "Ticket deleted");
        Ok(())
    }

    /// One ticket with its comments, attachments and overdue state.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for a missing or deleted ticket.
    pub async fn find_by_id(&self, ctx: &RequestContext, id: TicketId) -> Result<TicketView, Error> {
        let ticket = ctx
            .bounded(Component::Store, self.timeout, self.deps.store.find_by_id(id))
            .await?;
        self.view(ctx, ticket).await
    }

    /// One page of tickets, each as a [`TicketView`].
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a negative or oversized filter.
    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        filter: TicketFilter,
    ) -> Result<Vec<TicketView>, Error> {
        self.deps.validator.validate_filter(&filter)?;

        let tickets = ctx
            .bounded(Component::Store, self.timeout, self.deps.store.find_all(&filter))
            .await?;

        let mut views = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            views.push(self.view(ctx, ticket).await?);
        }
        Ok(views)
    }

    /// Audit rows of a ticket, most recent first.
    ///
    /// # Errors
    ///
    /// [`Error::TransientIo`] if the ledger is unreachable.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        id: TicketId,
    ) -> Result<Vec<TicketHistory>, Error> {
        ctx.bounded(Component::Store, self.timeout, self.deps.history.by_ticket(id))
            .await
    }

    async fn record(&self, ctx: &RequestContext, ticket: &Ticket) -> Result<TicketHistory, Error> {
        let entry = NewHistoryEntry {
            ticket_id: ticket.id,
            user_id: ctx.acting_user(),
            status: ticket.status.clone(),
            priority: ticket.priority.clone(),
            changed_at: self.deps.clock.now(),
        };

        ctx.bounded(Component::Store, self.timeout, self.deps.history.record(entry))
            .await
            .map_err(|e| consistency_gap(ticket.id, MutationStep::HistoryRecord, &e))
    }

    async fn user(&self, ctx: &RequestContext, id: UserId) -> Result<Option<User>, Error> {
        ctx.bounded(Component::Store, self.timeout, async {
            self.deps.users.find_user(id).await.map_err(Error::from)
        })
        .await
    }

    async fn view(&self, ctx: &RequestContext, ticket: Ticket) -> Result<TicketView, Error> {
        let creator = self.user(ctx, ticket.user_id).await?.map(UserSummary::from);

        let comments = ctx
            .bounded(Component::Store, self.timeout, async {
                self.deps
                    .comments
                    .list_by_ticket(ticket.id)
                    .await
                    .map_err(Error::from)
            })
            .await?;

        let attachments = ctx
            .bounded(Component::Store, self.timeout, async {
                self.deps
                    .attachments
                    .list_by_ticket(ticket.id)
                    .await
                    .map_err(Error::from)
            })
            .await?;

        let overdue = overdue_status(&ticket.status, ticket.due_by, self.deps.clock.now());

        Ok(TicketView {
            ticket,
            creator,
            comments,
            attachments,
            penalty: overdue.penalty,
            overdue_by: overdue.overdue_by,
        })
    }
}

fn consistency_gap(ticket_id: TicketId, step: MutationStep, cause: &Error) -> Error {
    tracing::error!(
        ticket_id = %ticket_id,
        step = %step,
        error = %cause,
        "Ticket committed but a follow-up step failed"
    );
    metrics::counter!("helpdesk_consistency_gaps_total", "step" => step.as_str()).increment(1);

    Error::ConsistencyGap {
        ticket_id,
        step,
        reason: cause.to_string(),
    }
}
