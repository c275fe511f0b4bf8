//! Inputs accepted from the request boundary.

use crate::types::{TicketId, UserId};
use serde::{Deserialize, Serialize};

/// Pagination of a ticket listing.
///
/// `limit == 0` means "no limit". `page` is 1-based; anything below 1 is
/// treated as the first page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketFilter {
    /// Page size, 0 for everything.
    #[serde(default)]
    pub limit: i64,
    /// 1-based page number.
    #[serde(default)]
    pub page: i64,
}

impl TicketFilter {
    /// Filter for one page.
    #[must_use]
    pub const fn new(limit: i64, page: i64) -> Self {
        Self { limit, page }
    }

    /// Same filter with `page` clamped to at least 1.
    ///
    /// Two filters that select the same rows normalize to the same value,
    /// which is what the listing cache key is derived from.
    #[must_use]
    pub const fn normalized(self) -> Self {
        Self {
            limit: self.limit,
            page: if self.limit == 0 || self.page < 1 { 1 } else { self.page },
        }
    }

    /// Row offset of the (normalized) page, saturating at `i64::MAX`.
    #[must_use]
    pub const fn offset(self) -> i64 {
        let normalized = self.normalized();
        (normalized.page - 1).saturating_mul(normalized.limit)
    }
}

/// Fields of a new ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTicketInput {
    /// Short summary.
    pub title: String,
    /// Full description.
    pub description: String,
    /// Initial status.
    pub status: String,
    /// Initial priority.
    pub priority: String,
    /// Handler to assign.
    pub assigned_to: UserId,
}

/// Fields of a ticket update. Same shape as creation plus an optional
/// version guard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTicketInput {
    /// Short summary.
    pub title: String,
    /// Full description.
    pub description: String,
    /// New status.
    pub status: String,
    /// New priority.
    pub priority: String,
    /// New handler.
    pub assigned_to: UserId,
    /// Version the caller read. `None` means last writer wins.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// A comment to post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCommentInput {
    /// Ticket to comment on.
    pub ticket_id: TicketId,
    /// Body.
    pub content: String,
}

/// New body of an existing comment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCommentInput {
    /// Body.
    pub content: String,
}

/// A file reference to attach to a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAttachmentInput {
    /// Ticket to attach to.
    pub ticket_id: TicketId,
    /// Path of the already uploaded file.
    pub file_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_clamps_page() {
        assert_eq!(TicketFilter::new(10, 0).normalized(), TicketFilter::new(10, 1));
        assert_eq!(TicketFilter::new(10, -3).normalized(), TicketFilter::new(10, 1));
        assert_eq!(TicketFilter::new(10, 4).normalized(), TicketFilter::new(10, 4));
        assert_eq!(TicketFilter::new(0, 7).normalized(), TicketFilter::new(0, 1));
    }

    #[test]
    fn offsets() {
        assert_eq!(TicketFilter::new(10, 1).offset(), 0);
        assert_eq!(TicketFilter::new(10, 3).offset(), 20);
        assert_eq!(TicketFilter::new(25, 0).offset(), 0);
        assert_eq!(TicketFilter::new(0, 9).offset(), 0);
    }

    #[test]
    fn offset_saturates_on_huge_pages() {
        assert_eq!(TicketFilter::new(10, i64::MAX).offset(), i64::MAX);
        assert_eq!(TicketFilter::new(i64::MAX, 3).offset(), i64::MAX);
    }
}
