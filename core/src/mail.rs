//! Outbound mail.

pub use crate::error::MailError;
use std::future::Future;

/// A plain-text email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Mail transport.
///
/// # Implementations
///
/// - `SmtpMailer` in the `helpdesk` crate
/// - `RecordingMailer` in `helpdesk-testing`
pub trait Mailer: Send + Sync {
    /// Send one email.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidMessage`] if the message cannot be built and
    /// [`MailError::Delivery`] if the relay fails.
    fn send(&self, email: &Email) -> impl Future<Output = Result<(), MailError>> + Send;
}
