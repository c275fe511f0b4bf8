//! # Helpdesk Core
//!
//! Domain types and the consistency core behind every ticket mutation.
//!
//! ## Components
//!
//! - [`store::CachedTicketStore`]: cache-aside reads over the durable store,
//!   write-triggered invalidation.
//! - [`history::HistoryRecorder`]: append-only audit ledger, optionally
//!   mirrored to a search index.
//! - [`notification::BrokerNotificationDispatcher`]: publish to the broker,
//!   then record the notification.
//! - [`overdue`]: due dates and the penalty projection, computed at read time.
//!
//! Every backend sits behind a capability trait. Production implementations
//! live in `helpdesk-postgres`, `helpdesk-redis` and `helpdesk-redpanda`; test
//! doubles live in `helpdesk-testing`. This crate performs no I/O itself.

pub mod broker;
pub mod cache;
pub mod dead_letter;
pub mod environment;
pub mod error;
pub mod history;
pub mod input;
pub mod mail;
pub mod notification;
pub mod overdue;
pub mod repository;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{Error, ErrorKind, Result};
