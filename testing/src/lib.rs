//! # Helpdesk Testing
//!
//! In-memory implementations of every helpdesk capability trait, plus
//! deterministic clocks.
//!
//! The doubles are cheap to clone and share their state between clones, so a
//! test can hand one clone to the component under test and keep another to
//! make assertions (call counters, recorded messages, failure injection).
//!
//! ## Example
//!
//! ```
//! use helpdesk_testing::mocks::{ManualClock, test_clock};
//! use helpdesk_core::environment::Clock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(test_clock().now());
//! let start = clock.now();
//! clock.advance(Duration::minutes(61));
//! assert_eq!(clock.now() - start, Duration::minutes(61));
//! ```

use chrono::{DateTime, Utc};
use helpdesk_core::environment::Clock;

pub mod broker;
pub mod directory;
pub mod history;
pub mod notifications;
pub mod tickets;

pub use broker::InMemoryBroker;
pub use directory::{InMemoryAttachmentRepository, InMemoryCommentRepository, InMemoryUserDirectory};
pub use history::{InMemoryHistoryIndex, InMemoryHistoryRecorder};
pub use notifications::{
    InMemoryDeadLetters, InMemoryNotificationRepository, RecordingDispatcher, RecordingMailer,
};
pub use tickets::{InMemoryTicketCache, InMemoryTicketRepository};

/// Error message used by every injected failure.
pub const INJECTED_FAILURE: &str = "injected failure";

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Clock starting at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move time forward.
        ///
        /// # Panics
        ///
        /// Panics if the lock is poisoned.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }

        /// Jump to an absolute time.
        ///
        /// # Panics
        ///
        /// Panics if the lock is poisoned.
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap() = to;
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
