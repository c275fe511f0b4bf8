//! Production wiring of every service onto `PostgreSQL`, Redis and Redpanda.

use crate::attachments::AttachmentService;
use crate::comments::CommentService;
use crate::config::Config;
use crate::lifecycle::{LifecycleDependencies, TicketLifecycle};
use crate::search::ElasticsearchHistoryIndex;
use crate::sessions::SessionResolver;
use helpdesk_core::broker::MessageBroker;
use helpdesk_core::environment::{Clock, SystemClock};
use helpdesk_core::error::Error;
use helpdesk_core::history::{HistoryRecorder, IndexedHistoryRecorder};
use helpdesk_core::notification::BrokerNotificationDispatcher;
use helpdesk_core::store::{CachedTicketStore, TicketStore};
use helpdesk_core::validation::{InputValidator, Validator};
use helpdesk_postgres::{
    DeadLetterQueue, PostgresAttachmentRepository, PostgresCommentRepository,
    PostgresHistoryRecorder, PostgresNotificationRepository, PostgresTicketRepository,
    PostgresUserDirectory,
};
use helpdesk_redis::RedisTicketCache;
use helpdesk_redpanda::RedpandaBroker;
use std::sync::Arc;

/// Every service, connected to the production backends.
#[derive(Clone)]
pub struct Helpdesk {
    /// Ticket use cases.
    pub lifecycle: TicketLifecycle,
    /// Comment use cases.
    pub comments: CommentService,
    /// Attachment use cases.
    pub attachments: AttachmentService,
    /// Token resolution.
    pub sessions: SessionResolver,
    /// Failed notification management.
    pub dead_letters: DeadLetterQueue,
    /// Broker shared by the dispatcher and the email worker.
    pub broker: Arc<RedpandaBroker>,
}

impl Helpdesk {
    /// Connect to every backend, run pending migrations and declare the
    /// notification topology.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] naming the backend that could not be
    /// reached.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        tracing::info!("Connecting to PostgreSQL...");
        let pool =
            helpdesk_postgres::connect(&config.postgres.url, config.postgres.max_connections)
                .await?;
        helpdesk_postgres::migrate(&pool).await?;

        tracing::info!("Connecting to Redis...");
        let cache = RedisTicketCache::new(&config.redis.url).await?;

        tracing::info!(brokers = %config.redpanda.brokers, "Connecting to Redpanda...");
        let broker = Arc::new(
            RedpandaBroker::builder()
                .brokers(&config.redpanda.brokers)
                .replication_factor(config.redpanda.replication_factor)
                .build()?,
        );
        broker.declare(&config.redpanda.topology()).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let validator: Arc<dyn Validator> = Arc::new(InputValidator::new());
        let timeout = config.server.request_timeout;

        let store: Arc<dyn TicketStore> = Arc::new(
            CachedTicketStore::new(
                Arc::new(PostgresTicketRepository::new(pool.clone())),
                Arc::new(cache),
            )
            .with_ttl(config.redis.cache_ttl),
        );

        let ledger: Arc<dyn HistoryRecorder> = Arc::new(PostgresHistoryRecorder::new(pool.clone()));
        let history: Arc<dyn HistoryRecorder> = match &config.search.elasticsearch_url {
            Some(url) => {
                tracing::info!(url = %url, "Mirroring ticket history to Elasticsearch");
                Arc::new(IndexedHistoryRecorder::new(
                    ledger,
                    Arc::new(ElasticsearchHistoryIndex::new(url.clone())),
                ))
            }
            None => ledger,
        };

        let dispatcher = Arc::new(BrokerNotificationDispatcher::new(
            broker.clone(),
            config.redpanda.topology(),
            Arc::new(PostgresNotificationRepository::new(pool.clone())),
        ));

        let users = Arc::new(PostgresUserDirectory::new(pool.clone()));
        let comments = Arc::new(PostgresCommentRepository::new(pool.clone()));
        let attachments = Arc::new(PostgresAttachmentRepository::new(pool.clone()));

        let lifecycle = TicketLifecycle::new(LifecycleDependencies {
            store: Arc::clone(&store),
            history,
            dispatcher,
            users: users.clone(),
            comments: comments.clone(),
            attachments: attachments.clone(),
            validator: Arc::clone(&validator),
            clock: Arc::clone(&clock),
        })
        .with_default_timeout(timeout);

        Ok(Self {
            lifecycle,
            comments: CommentService::new(
                comments,
                Arc::clone(&store),
                Arc::clone(&validator),
                Arc::clone(&clock),
            )
            .with_default_timeout(timeout),
            attachments: AttachmentService::new(attachments, store, validator, Arc::clone(&clock))
                .with_default_timeout(timeout),
            sessions: SessionResolver::new(users, clock, timeout),
            dead_letters: DeadLetterQueue::new(pool),
            broker,
        })
    }
}
