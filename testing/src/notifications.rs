//! Notification-side doubles: repository, dispatcher, mailer, dead letters.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use crate::INJECTED_FAILURE;
use async_trait::async_trait;
use helpdesk_core::dead_letter::{DeadLetterSink, FailedDelivery};
use helpdesk_core::error::{Component, Error, MailError, StoreError};
use helpdesk_core::mail::{Email, Mailer};
use helpdesk_core::notification::{DispatchReceipt, NotificationDispatcher, NotificationRepository};
use helpdesk_core::types::{Notification, NotificationId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Vec-backed [`NotificationRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationRepository {
    rows: Arc<Mutex<Vec<(NotificationId, Notification)>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryNotificationRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored rows.
    #[must_use]
    pub fn rows(&self) -> Vec<(NotificationId, Notification)> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn save(&self, notification: &Notification) -> Result<NotificationId, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(INJECTED_FAILURE.to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let id = NotificationId::new(i64::try_from(rows.len()).unwrap_or(i64::MAX) + 1);
        rows.push((id, notification.clone()));
        Ok(id)
    }
}

/// [`NotificationDispatcher`] that records what it was asked to send.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    dispatched: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    /// Dispatcher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following dispatch fail like a broker outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Notifications dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> Vec<Notification> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<DispatchReceipt, Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::transient(Component::Broker, INJECTED_FAILURE));
        }
        let mut dispatched = self.dispatched.lock().unwrap();
        dispatched.push(notification);
        let id = i64::try_from(dispatched.len()).unwrap_or(i64::MAX);
        Ok(DispatchReceipt {
            notification_id: Some(NotificationId::new(id)),
        })
    }
}

/// [`Mailer`] that records sent mail and can fail or hang on demand.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<Email>>>,
    attempts: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    always_fail: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
}

impl RecordingMailer {
    /// Mailer that delivers everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` attempts with a delivery error.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Fail every attempt until switched off.
    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Never complete a send, like a process stuck mid-delivery.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Successfully delivered mail.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    /// Send attempts, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(MailError::Delivery(INJECTED_FAILURE.to_string()));
        }
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if consumed.is_ok() {
            return Err(MailError::Delivery(INJECTED_FAILURE.to_string()));
        }

        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Vec-backed [`DeadLetterSink`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetters {
    entries: Arc<Mutex<Vec<FailedDelivery>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryDeadLetters {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Parked messages.
    #[must_use]
    pub fn entries(&self) -> Vec<FailedDelivery> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn add_entry(&self, entry: FailedDelivery) -> Result<i64, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(INJECTED_FAILURE.to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        entries.push(entry);
        Ok(i64::try_from(entries.len()).unwrap_or(i64::MAX))
    }
}
