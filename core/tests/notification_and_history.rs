//! Publication order of the dispatcher and the mirrored audit ledger.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration;
use helpdesk_core::broker::BrokerTopology;
use helpdesk_core::environment::Clock;
use helpdesk_core::error::ErrorKind;
use helpdesk_core::history::{HistoryRecorder, IndexedHistoryRecorder};
use helpdesk_core::notification::{BrokerNotificationDispatcher, NotificationDispatcher};
use helpdesk_core::types::{
    NewHistoryEntry, Notification, NotificationStatus, Priority, TicketId, TicketStatus, UserId,
};
use helpdesk_testing::mocks::test_clock;
use helpdesk_testing::{
    InMemoryBroker, InMemoryHistoryIndex, InMemoryHistoryRecorder, InMemoryNotificationRepository,
};
use std::sync::Arc;

fn notification() -> Notification {
    Notification {
        ticket_id: TicketId::new(5),
        user_id: UserId::new(2),
        email: "agent@helpdesk.test".to_string(),
        subject: "Printer on fire".to_string(),
        message: "Third floor".to_string(),
        status: NotificationStatus::Pending,
        created_at: test_clock().now(),
    }
}

fn dispatcher(
    broker: &InMemoryBroker,
    rows: &InMemoryNotificationRepository,
) -> BrokerNotificationDispatcher {
    BrokerNotificationDispatcher::new(
        Arc::new(broker.clone()),
        BrokerTopology::default(),
        Arc::new(rows.clone()),
    )
}

#[tokio::test]
async fn dispatch_publishes_json_then_records_pending_row() {
    let broker = InMemoryBroker::new();
    let rows = InMemoryNotificationRepository::new();

    let receipt = dispatcher(&broker, &rows).dispatch(notification()).await.unwrap();
    assert!(receipt.notification_id.is_some());

    let published = broker.published();
    assert_eq!(published.len(), 1);
    let (exchange, routing_key, payload) = &published[0];
    assert_eq!(exchange, "notification");
    assert_eq!(routing_key, "emailQueue");

    let decoded: Notification = serde_json::from_slice(payload).unwrap();
    assert_eq!(decoded, notification());
    assert_eq!(rows.rows()[0].1.status, NotificationStatus::Pending);
}

#[tokio::test]
async fn failed_publish_records_nothing() {
    let broker = InMemoryBroker::new();
    broker.set_publish_failing(true);
    let rows = InMemoryNotificationRepository::new();

    let error = dispatcher(&broker, &rows)
        .dispatch(notification())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TransientIo);
    assert!(rows.rows().is_empty());
}

#[tokio::test]
async fn failed_record_after_publish_is_tolerated() {
    let broker = InMemoryBroker::new();
    let rows = InMemoryNotificationRepository::new();
    rows.set_failing(true);

    let receipt = dispatcher(&broker, &rows).dispatch(notification()).await.unwrap();
    assert_eq!(receipt.notification_id, None);
    assert_eq!(broker.ready_count("emailQueue"), 1);
}

fn entry(ticket: i64, status: TicketStatus, minutes: i64) -> NewHistoryEntry {
    NewHistoryEntry {
        ticket_id: TicketId::new(ticket),
        user_id: UserId::new(1),
        status,
        priority: Priority::Low,
        changed_at: test_clock().now() + Duration::minutes(minutes),
    }
}

#[tokio::test]
async fn mirrored_ledger_indexes_every_row_and_reads_newest_first() {
    let ledger = InMemoryHistoryRecorder::new();
    let index = InMemoryHistoryIndex::new();
    let recorder = IndexedHistoryRecorder::new(Arc::new(ledger.clone()), Arc::new(index.clone()));

    recorder.record(entry(1, TicketStatus::Open, 0)).await.unwrap();
    recorder.record(entry(1, TicketStatus::InProgress, 10)).await.unwrap();
    recorder.record(entry(2, TicketStatus::Open, 5)).await.unwrap();

    assert_eq!(index.documents().len(), 3);

    let rows = recorder.by_ticket(TicketId::new(1)).await.unwrap();
    let statuses: Vec<_> = rows.iter().map(|r| r.status.clone()).collect();
    assert_eq!(statuses, vec![TicketStatus::InProgress, TicketStatus::Open]);

    let open = recorder.by_status(&TicketStatus::Open).await.unwrap();
    let tickets: Vec<i64> = open.iter().map(|r| r.ticket_id.get()).collect();
    assert_eq!(tickets, vec![2, 1]);

    assert_eq!(recorder.by_priority(&Priority::Low).await.unwrap().len(), 3);
    assert_eq!(recorder.by_user(UserId::new(1)).await.unwrap().len(), 3);
}

#[tokio::test]
async fn index_failure_is_surfaced() {
    let ledger = InMemoryHistoryRecorder::new();
    let index = InMemoryHistoryIndex::new();
    index.set_failing(true);
    let recorder = IndexedHistoryRecorder::new(Arc::new(ledger.clone()), Arc::new(index));

    let error = recorder
        .record(entry(1, TicketStatus::Open, 0))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TransientIo);
    assert_eq!(ledger.rows().len(), 1);
}
