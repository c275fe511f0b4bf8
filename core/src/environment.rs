//! Injected dependencies that are not backends: time and request scope.

use crate::error::{Component, Error};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use helpdesk_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let earlier = clock.now();
/// assert!(clock.now() >= earlier);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Who is acting and how long they are willing to wait.
///
/// Built at the request boundary (after the session was resolved) and
/// passed by reference to every lifecycle operation. Each I/O step made on
/// behalf of the request is bounded by the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    acting_user: UserId,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Context without a deadline.
    #[must_use]
    pub const fn new(acting_user: UserId) -> Self {
        Self {
            acting_user,
            deadline: None,
        }
    }

    /// Context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(acting_user: UserId, timeout: Duration) -> Self {
        Self {
            acting_user,
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Acting user.
    #[must_use]
    pub const fn acting_user(&self) -> UserId {
        self.acting_user
    }

    /// Absolute deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run one I/O step, failing with a transient error once the deadline passes.
    ///
    /// Contexts without a deadline bound the step by `fallback` instead.
    ///
    /// # Errors
    ///
    /// Returns the step's own error, or [`Error::TransientIo`] for `component`
    /// when time runs out first.
    pub async fn bounded<T, F>(
        &self,
        component: Component,
        fallback: Duration,
        step: F,
    ) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let deadline = self.deadline.unwrap_or_else(|| Instant::now() + fallback);
        tokio::time::timeout_at(deadline, step)
            .await
            .map_err(|_| Error::transient(component, "request deadline exceeded"))?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn bounded_step_times_out_as_transient() {
        let ctx = RequestContext::with_timeout(UserId::new(1), Duration::from_millis(50));

        let result: Result<(), Error> = ctx
            .bounded(Component::Store, Duration::from_secs(60), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransientIo);
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn step_within_fallback_passes_through() {
        let ctx = RequestContext::new(UserId::new(1));
        let value = ctx
            .bounded(Component::Cache, Duration::from_secs(1), async { Ok(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(ctx.acting_user(), UserId::new(1));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_applies_without_deadline() {
        let ctx = RequestContext::new(UserId::new(1));

        let result: Result<(), Error> = ctx
            .bounded(Component::Broker, Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::TransientIo);
    }
}
