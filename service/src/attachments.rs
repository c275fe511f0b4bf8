//! Ticket attachments. Append-only: no update, no delete.

use helpdesk_core::environment::{Clock, RequestContext};
use helpdesk_core::error::{Component, Error};
use helpdesk_core::input::CreateAttachmentInput;
use helpdesk_core::repository::AttachmentRepository;
use helpdesk_core::store::TicketStore;
use helpdesk_core::types::{Attachment, NewAttachment, TicketId};
use helpdesk_core::validation::Validator;
use std::sync::Arc;
use std::time::Duration;

/// Records references to uploaded files.
#[derive(Clone)]
pub struct AttachmentService {
    attachments: Arc<dyn AttachmentRepository>,
    tickets: Arc<dyn TicketStore>,
    validator: Arc<dyn Validator>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl AttachmentService {
    /// Create an attachment service.
    #[must_use]
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        tickets: Arc<dyn TicketStore>,
        validator: Arc<dyn Validator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attachments,
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

    /// Attachments of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// [`Error::TransientIo`] if the store is unreachable.
    pub async fn list_by_ticket(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
    ) -> Result<Vec<Attachment>, Error> {
        ctx.bounded(Component::Store, self.timeout, async {
            self.attachments
                .list_by_ticket(ticket_id)
                .await
                .map_err(Error::from)
        })
        .await
    }

    /// Attach an uploaded file to a live ticket.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty path, [`Error::NotFound`] when the
    /// ticket is missing or deleted.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: CreateAttachmentInput,
    ) -> Result<Attachment, Error> {
        self.validator.validate_create_attachment(&input)?;

        ctx.bounded(
            Component::Store,
            self.timeout,
            self.tickets.find_by_id(input.ticket_id),
        )
        .await?;

        let attachment = NewAttachment {
            ticket_id: input.ticket_id,
            file_path: input.file_path,
            uploaded_at: self.clock.now(),
        };
        let created = ctx
            .bounded(Component::Store, self.timeout, async {
                self.attachments.insert(attachment).await.map_err(Error::from)
            })
            .await?;

        tracing::info!(
            attachment_id = %created.id,
            ticket_id = %created.ticket_id,
            "Attachment recorded"
        );
        Ok(created)
    }
}
