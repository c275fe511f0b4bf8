//! Due dates and the overdue/penalty projection.
//!
//! A ticket is due `priority.response_window()` after its last mutation. While
//! it is still active (open or in progress) and past that moment, it carries a
//! penalty and a human-readable "overdue by" string.

use crate::types::{Priority, TicketStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Deadline for a ticket mutated at `at` with the given priority.
#[must_use]
pub fn due_by_for(priority: &Priority, at: DateTime<Utc>) -> DateTime<Utc> {
    at + priority.response_window()
}

/// Derived overdue state of a ticket at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overdue {
    /// Whether the ticket is active and past due.
    pub penalty: bool,
    /// How late it is, empty unless `penalty`.
    pub overdue_by: String,
}

/// Compute the overdue state of a ticket.
///
/// Tickets without a due date, or in a non-active status, never carry a
/// penalty.
#[must_use]
pub fn overdue_status(
    status: &TicketStatus,
    due_by: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Overdue {
    match due_by {
        Some(due_by) if status.is_active() && now > due_by => Overdue {
            penalty: true,
            overdue_by: format_overdue(now - due_by),
        },
        _ => Overdue::default(),
    }
}

/// Render a lateness duration.
///
/// Only the two most significant units are shown, and the second one is
/// dropped when it is zero:
///
/// ```
/// use chrono::Duration;
/// use helpdesk_core::overdue::format_overdue;
///
/// assert_eq!(format_overdue(Duration::seconds(59)), "59 seconds");
/// assert_eq!(format_overdue(Duration::seconds(60)), "1 minutes");
/// assert_eq!(format_overdue(Duration::seconds(3600)), "1h");
/// assert_eq!(format_overdue(Duration::seconds(3661)), "1 hours 1 minutes");
/// assert_eq!(format_overdue(Duration::seconds(86_400)), "1d");
/// assert_eq!(format_overdue(Duration::seconds(90_000)), "1 days 1 hours");
/// ```
#[must_use]
pub fn format_overdue(late_by: Duration) -> String {
    let total_seconds = late_by.num_seconds().max(0);
    let days = total_seconds / 86_400;
    let hours = total_seconds / 3_600;
    let minutes = total_seconds / 60;

    if days > 0 {
        let hours = hours % 24;
        if hours > 0 {
            format!("{days} days {hours} hours")
        } else {
            format!("{days}d")
        }
    } else if hours > 0 {
        let minutes = minutes % 60;
        if minutes > 0 {
            format!("{hours} hours {minutes} minutes")
        } else {
            format!("{hours}h")
        }
    } else if minutes > 0 {
        let seconds = total_seconds % 60;
        if seconds > 0 {
            format!("{minutes} minutes {seconds} seconds")
        } else {
            format!("{minutes} minutes")
        }
    } else {
        format!("{total_seconds} seconds")
    }
}
