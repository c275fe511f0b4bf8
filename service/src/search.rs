//! Elasticsearch mirror of the audit ledger.

use async_trait::async_trait;
use helpdesk_core::error::IndexError;
use helpdesk_core::history::HistoryIndex;
use helpdesk_core::types::TicketHistory;
use reqwest::Client;

/// Index holding one document per ledger row.
pub const HISTORY_INDEX: &str = "ticket_history";

/// [`HistoryIndex`] over the Elasticsearch document API.
///
/// Each row is written to `{base_url}/ticket_history/_doc/{id}`, so writing
/// the same row twice replaces the document instead of duplicating it.
#[derive(Clone, Debug)]
pub struct ElasticsearchHistoryIndex {
    client: Client,
    base_url: String,
}

impl ElasticsearchHistoryIndex {
    /// Index on the cluster at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Index using a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn document_url(&self, entry: &TicketHistory) -> String {
        format!("{}/{HISTORY_INDEX}/_doc/{}", self.base_url, entry.id)
    }
}

#[async_trait]
impl HistoryIndex for ElasticsearchHistoryIndex {
    async fn index(&self, entry: &TicketHistory) -> Result<(), IndexError> {
        let response = self
            .client
            .put(self.document_url(entry))
            .json(entry)
            .send()
            .await
            .map_err(|e| IndexError(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError(format!("Elasticsearch returned {status}: {body}")));
        }

        tracing::debug!(history_id = %entry.id, ticket_id = %entry.ticket_id, "History row indexed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use helpdesk_core::types::{HistoryId, Priority, TicketId, TicketStatus, UserId};

    fn row() -> TicketHistory {
        TicketHistory {
            id: HistoryId::new(42),
            ticket_id: TicketId::new(7),
            user_id: UserId::new(1),
            status: TicketStatus::Open,
            priority: Priority::High,
            changed_at: Utc::now(),
        }
    }

    #[test]
    fn document_is_keyed_by_history_id() {
        let index = ElasticsearchHistoryIndex::new("http://localhost:9200/");
        assert_eq!(
            index.document_url(&row()),
            "http://localhost:9200/ticket_history/_doc/42"
        );
    }

    #[tokio::test]
    async fn unreachable_cluster_is_an_index_error() {
        // Port 9 (discard) is not listening on a test machine.
        let index = ElasticsearchHistoryIndex::new("http://127.0.0.1:9");
        assert!(index.index(&row()).await.is_err());
    }
}
