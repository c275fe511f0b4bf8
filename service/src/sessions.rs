//! Bearer token to acting user.

use helpdesk_core::environment::{Clock, RequestContext};
use helpdesk_core::error::{Component, Error};
use helpdesk_core::repository::SessionStore;
use std::sync::Arc;
use std::time::Duration;

/// Resolves session tokens into request contexts.
#[derive(Clone)]
pub struct SessionResolver {
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
}

impl SessionResolver {
    /// Resolver whose contexts expire `request_timeout` after resolution.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            clock,
            request_timeout,
        }
    }

    /// Context for the owner of an active session.
    ///
    /// # Errors
    ///
    /// [`Error::Authorization`] for an empty, unknown or expired token,
    /// [`Error::TransientIo`] if the session store is unreachable.
    pub async fn resolve(&self, token: &str) -> Result<RequestContext, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Authorization("missing session token".to_string()));
        }

        let session = tokio::time::timeout(
            self.request_timeout,
            self.sessions.find_active(token, self.clock.now()),
        )
        .await
        .map_err(|_| Error::transient(Component::Store, "session lookup timed out"))??
        .ok_or_else(|| {
            tracing::debug!("Rejected unknown or expired session");
            Error::Authorization("invalid or expired session".to_string())
        })?;

        Ok(RequestContext::with_timeout(
            session.user_id,
            self.request_timeout,
        ))
    }
}
