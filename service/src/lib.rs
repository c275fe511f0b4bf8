//! # Helpdesk
//!
//! Application layer of the helpdesk: the use cases callers invoke and the
//! background worker that delivers notification mail.
//!
//! - [`lifecycle::TicketLifecycle`]: create, update, delete and read tickets
//! - [`comments::CommentService`], [`attachments::AttachmentService`]
//! - [`sessions::SessionResolver`]: bearer token to [`RequestContext`]
//! - [`worker::EmailWorker`]: drains the notification queue
//! - [`smtp::SmtpMailer`], [`search::ElasticsearchHistoryIndex`]: outbound adapters
//! - [`app::Helpdesk`]: all of the above wired onto the production backends
//! - [`config`], [`metrics`], [`retry`]
//!
//! [`RequestContext`]: helpdesk_core::environment::RequestContext

pub mod app;
pub mod attachments;
pub mod comments;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod retry;
pub mod search;
pub mod sessions;
pub mod smtp;
pub mod worker;

pub use config::Config;
pub use lifecycle::{LifecycleDependencies, TicketLifecycle, TicketView};
pub use worker::{AckMode, EmailWorker};
