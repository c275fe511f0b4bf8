//! SMTP mailer using Lettre.

use crate::config::SmtpConfig;
use helpdesk_core::mail::{Email, MailError, Mailer};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// [`Mailer`] that relays plain-text mail through an SMTP server.
///
/// The sender address doubles as the relay login.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    /// Mailer for the configured relay.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Delivery`] if the relay host is unusable.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| MailError::Delivery(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.from.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| MailError::InvalidMessage(format!("Invalid from address: {e}")))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| MailError::InvalidMessage(format!("Invalid to address: {e}")))?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::InvalidMessage(format!("Failed to build email: {e}")))
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || {
            transport
                .send(&message)
                .map_err(|e| MailError::Delivery(format!("Failed to send email: {e}")))
        })
        .await
        .map_err(|e| MailError::Delivery(format!("Email task failed: {e}")))?
        .map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(&SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            from: "helpdesk@example.com".to_string(),
            password: "secret".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn builds_plain_text_message() {
        let message = mailer()
            .build_message(&Email {
                to: "ops@example.com".to_string(),
                subject: "Printer jam".to_string(),
                body: "Paper stuck in tray 2".to_string(),
            })
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("Subject: Printer jam"));
        assert!(raw.contains("text/plain"));
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected_before_sending() {
        let result = mailer()
            .send(&Email {
                to: "not an address".to_string(),
                subject: "x".to_string(),
                body: "y".to_string(),
            })
            .await;

        assert!(matches!(result, Err(MailError::InvalidMessage(_))));
    }
}
