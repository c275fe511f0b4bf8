//! Input validation.
//!
//! Validation is a dependency like any other: services receive an
//! `Arc<dyn Validator>` in their constructor and call it before touching any
//! backend.

use crate::error::{Error, FieldViolation};
use crate::input::{
    CreateAttachmentInput, CreateCommentInput, CreateTicketInput, TicketFilter,
    UpdateCommentInput, UpdateTicketInput,
};

/// Checks request inputs before any side effect.
///
/// Every method returns [`Error::Validation`] listing all rejected fields.
pub trait Validator: Send + Sync {
    /// Validate a new ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when any field is rejected.
    fn validate_create_ticket(&self, input: &CreateTicketInput) -> Result<(), Error>;

    /// Validate a ticket update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when any field is rejected.
    fn validate_update_ticket(&self, input: &UpdateTicketInput) -> Result<(), Error>;

    /// Validate listing parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for negative or oversized values.
    fn validate_filter(&self, filter: &TicketFilter) -> Result<(), Error>;

    /// Validate a new comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when any field is rejected.
    fn validate_create_comment(&self, input: &CreateCommentInput) -> Result<(), Error>;

    /// Validate a comment edit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the body is rejected.
    fn validate_update_comment(&self, input: &UpdateCommentInput) -> Result<(), Error>;

    /// Validate a new attachment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when any field is rejected.
    fn validate_create_attachment(&self, input: &CreateAttachmentInput) -> Result<(), Error>;
}

/// Field rules for the helpdesk inputs.
#[derive(Debug, Clone)]
pub struct InputValidator {
    max_title_len: usize,
    max_page_size: i64,
}

impl Default for InputValidator {
    fn default() -> Self {
        Self {
            max_title_len: 255,
            max_page_size: 1_000,
        }
    }
}

impl InputValidator {
    /// Validator with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the maximum title length (in characters).
    #[must_use]
    pub const fn with_max_title_len(mut self, max: usize) -> Self {
        self.max_title_len = max;
        self
    }

    /// Override the maximum page size.
    #[must_use]
    pub const fn with_max_page_size(mut self, max: i64) -> Self {
        self.max_page_size = max;
        self
    }

    fn check_ticket_fields(
        &self,
        violations: &mut Vec<FieldViolation>,
        title: &str,
        description: &str,
        status: &str,
        priority: &str,
        assigned_to: i64,
    ) {
        required(violations, "title", title);
        if title.chars().count() > self.max_title_len {
            violations.push(FieldViolation::new(
                "title",
                format!("must be at most {} characters", self.max_title_len),
            ));
        }
        required(violations, "description", description);
        required(violations, "status", status);
        required(violations, "priority", priority);
        positive(violations, "assigned_to", assigned_to);
    }
}

fn required(violations: &mut Vec<FieldViolation>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        violations.push(FieldViolation::new(field, "is required"));
    }
}

fn positive(violations: &mut Vec<FieldViolation>, field: &'static str, value: i64) {
    if value <= 0 {
        violations.push(FieldViolation::new(field, "must be a positive id"));
    }
}

fn finish(violations: Vec<FieldViolation>) -> Result<(), Error> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(violations))
    }
}

impl Validator for InputValidator {
    fn validate_create_ticket(&self, input: &CreateTicketInput) -> Result<(), Error> {
        let mut violations = Vec::new();
        self.check_ticket_fields(
            &mut violations,
            &input.title,
            &input.description,
            &input.status,
            &input.priority,
            input.assigned_to.get(),
        );
        finish(violations)
    }

    fn validate_update_ticket(&self, input: &UpdateTicketInput) -> Result<(), Error> {
        let mut violations = Vec::new();
        self.check_ticket_fields(
            &mut violations,
            &input.title,
            &input.description,
            &input.status,
            &input.priority,
            input.assigned_to.get(),
        );
        if input.expected_version.is_some_and(|v| v < 1) {
            violations.push(FieldViolation::new("expected_version", "must be at least 1"));
        }
        finish(violations)
    }

    fn validate_filter(&self, filter: &TicketFilter) -> Result<(), Error> {
        let mut violations = Vec::new();
        if filter.limit < 0 {
            violations.push(FieldViolation::new("limit", "must not be negative"));
        } else if filter.limit > self.max_page_size {
            violations.push(FieldViolation::new(
                "limit",
                format!("must be at most {}", self.max_page_size),
            ));
        }
        if filter.page < 0 {
            violations.push(FieldViolation::new("page", "must not be negative"));
        } else if filter.limit > 0 && (filter.page - 1).checked_mul(filter.limit).is_none() {
            violations.push(FieldViolation::new("page", "is out of range"));
        }
        finish(violations)
    }

    fn validate_create_comment(&self, input: &CreateCommentInput) -> Result<(), Error> {
        let mut violations = Vec::new();
        positive(&mut violations, "ticket_id", input.ticket_id.get());
        required(&mut violations, "content", &input.content);
        finish(violations)
    }

    fn validate_update_comment(&self, input: &UpdateCommentInput) -> Result<(), Error> {
        let mut violations = Vec::new();
        required(&mut violations, "content", &input.content);
        finish(violations)
    }

    fn validate_create_attachment(&self, input: &CreateAttachmentInput) -> Result<(), Error> {
        let mut violations = Vec::new();
        positive(&mut violations, "ticket_id", input.ticket_id.get());
        required(&mut violations, "file_path", &input.file_path);
        finish(violations)
    }
}
