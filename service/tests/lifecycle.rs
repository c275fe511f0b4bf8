//! Ticket lifecycle scenarios over in-memory backends.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Duration;
use helpdesk::lifecycle::{LifecycleDependencies, TicketLifecycle};
use helpdesk_core::environment::{Clock, RequestContext};
use helpdesk_core::error::{Entity, Error, ErrorKind, MutationStep};
use helpdesk_core::input::{CreateTicketInput, TicketFilter, UpdateTicketInput};
use helpdesk_core::repository::CommentRepository;
use helpdesk_core::store::CachedTicketStore;
use helpdesk_core::types::{NewComment, Priority, TicketId, TicketStatus, UserId};
use helpdesk_core::validation::InputValidator;
use helpdesk_testing::mocks::{ManualClock, test_clock};
use helpdesk_testing::{
    InMemoryAttachmentRepository, InMemoryCommentRepository, InMemoryHistoryRecorder,
    InMemoryTicketCache, InMemoryTicketRepository, InMemoryUserDirectory, RecordingDispatcher,
};
use std::sync::Arc;

struct Fixture {
    lifecycle: TicketLifecycle,
    repository: InMemoryTicketRepository,
    history: InMemoryHistoryRecorder,
    dispatcher: RecordingDispatcher,
    comments: InMemoryCommentRepository,
    clock: ManualClock,
}

const REPORTER: i64 = 1;
const HANDLER: i64 = 2;

fn fixture() -> Fixture {
    helpdesk_testing::init_tracing();

    let clock = ManualClock::new(test_clock().now());
    let repository = InMemoryTicketRepository::new();
    let cache = InMemoryTicketCache::with_clock(Arc::new(clock.clone()));
    let history = InMemoryHistoryRecorder::new();
    let dispatcher = RecordingDispatcher::new();
    let users = InMemoryUserDirectory::new();
    users.add_user(REPORTER, "Alice");
    users.add_user(HANDLER, "Bob");
    let comments = InMemoryCommentRepository::new();

    let lifecycle = TicketLifecycle::new(LifecycleDependencies {
        store: Arc::new(CachedTicketStore::new(
            Arc::new(repository.clone()),
            Arc::new(cache),
        )),
        history: Arc::new(history.clone()),
        dispatcher: Arc::new(dispatcher.clone()),
        users: Arc::new(users),
        comments: Arc::new(comments.clone()),
        attachments: Arc::new(InMemoryAttachmentRepository::new()),
        validator: Arc::new(InputValidator::new()),
        clock: Arc::new(clock.clone()),
    });

    Fixture {
        lifecycle,
        repository,
        history,
        dispatcher,
        comments,
        clock,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new(UserId::new(REPORTER))
}

fn create_input(priority: &str) -> CreateTicketInput {
    CreateTicketInput {
        title: "VPN down".to_string(),
        description: "Cannot connect since 9am".to_string(),
        status: "open".to_string(),
        priority: priority.to_string(),
        assigned_to: UserId::new(HANDLER),
    }
}

fn update_input(status: &str, priority: &str, expected_version: Option<i64>) -> UpdateTicketInput {
    UpdateTicketInput {
        title: "VPN down".to_string(),
        description: "Cannot connect since 9am".to_string(),
        status: status.to_string(),
        priority: priority.to_string(),
        assigned_to: UserId::new(HANDLER),
        expected_version,
    }
}

#[tokio::test]
async fn high_priority_ticket_becomes_overdue_after_an_hour() {
    let f = fixture();
    let created_at = f.clock.now();

    let ticket = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap();
    assert_eq!(ticket.due_by, Some(created_at + Duration::minutes(60)));

    f.clock.advance(Duration::minutes(61));
    let view = f.lifecycle.find_by_id(&ctx(), ticket.id).await.unwrap();

    assert_eq!(view.ticket.status, TicketStatus::Open);
    assert!(view.penalty);
    assert_eq!(view.overdue_by, "1 minutes");
}

#[tokio::test]
async fn create_records_history_and_notifies_the_assignee() {
    let f = fixture();

    let ticket = f.lifecycle.create(&ctx(), create_input("low")).await.unwrap();
    assert_eq!(ticket.user_id, UserId::new(REPORTER));
    assert_eq!(ticket.assigned_to, UserId::new(HANDLER));

    let rows = f.history.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ticket_id, ticket.id);
    assert_eq!(rows[0].user_id, UserId::new(REPORTER));
    assert_eq!(rows[0].priority, Priority::Low);

    let sent = f.dispatcher.dispatched();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ticket_id, ticket.id);
    assert_eq!(sent[0].user_id, UserId::new(HANDLER));
    assert_eq!(sent[0].email, "bob@helpdesk.test");
    assert_eq!(sent[0].subject, "VPN down");
    assert_eq!(sent[0].message, "Cannot connect since 9am");
}

#[tokio::test]
async fn every_mutation_appends_one_history_row_most_recent_first() {
    let f = fixture();

    let ticket = f.lifecycle.create(&ctx(), create_input("medium")).await.unwrap();
    assert_eq!(f.history.count_for(ticket.id), 1);

    f.clock.advance(Duration::minutes(1));
    f.lifecycle
        .update(&ctx(), ticket.id, update_input("in_progress", "high", None))
        .await
        .unwrap();
    assert_eq!(f.history.count_for(ticket.id), 2);

    f.clock.advance(Duration::minutes(1));
    f.lifecycle.delete(&ctx(), ticket.id).await.unwrap();
    assert_eq!(f.history.count_for(ticket.id), 3);

    let rows = f.lifecycle.history(&ctx(), ticket.id).await.unwrap();
    assert!(rows.windows(2).all(|pair| pair[0].changed_at > pair[1].changed_at));
    assert_eq!(rows[0].status, TicketStatus::InProgress);
    assert_eq!(rows[0].priority, Priority::High);
    assert_eq!(rows[2].status, TicketStatus::Open);

    // Updates and deletes never notify.
    assert_eq!(f.dispatcher.dispatched().len(), 1);
}

#[tokio::test]
async fn update_recomputes_due_by_and_keeps_the_creator() {
    let f = fixture();
    let ticket = f.lifecycle.create(&ctx(), create_input("very_low")).await.unwrap();
    let before = f.lifecycle.find_by_id(&ctx(), ticket.id).await.unwrap();
    assert_eq!(before.ticket.priority, Priority::VeryLow);

    f.clock.advance(Duration::minutes(10));
    let editor = RequestContext::new(UserId::new(HANDLER));
    let updated = f
        .lifecycle
        .update(&editor, ticket.id, update_input("open", "HIGH", Some(1)))
        .await
        .unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.user_id, UserId::new(REPORTER));
    assert_eq!(updated.due_by, Some(f.clock.now() + Duration::minutes(60)));
    assert_eq!(f.history.rows()[1].user_id, UserId::new(HANDLER));

    // The copy cached by the first read was dropped.
    let view = f.lifecycle.find_by_id(&ctx(), ticket.id).await.unwrap();
    assert_eq!(view.ticket.priority, Priority::High);
}

#[tokio::test]
async fn stale_version_is_rejected_without_side_effects() {
    let f = fixture();
    let ticket = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap();
    f.lifecycle
        .update(&ctx(), ticket.id, update_input("in_progress", "high", Some(1)))
        .await
        .unwrap();

    let error = f
        .lifecycle
        .update(&ctx(), ticket.id, update_input("closed", "low", Some(1)))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Conflict);
    assert_eq!(f.repository.row(ticket.id).unwrap().status, TicketStatus::InProgress);
    assert_eq!(f.history.count_for(ticket.id), 2);
}

#[tokio::test]
async fn missing_assignee_fails_before_any_write() {
    let f = fixture();
    let input = CreateTicketInput {
        assigned_to: UserId::new(99),
        ..create_input("high")
    };

    let error = f.lifecycle.create(&ctx(), input).await.unwrap_err();

    assert_eq!(
        error,
        Error::NotFound {
            entity: Entity::User,
            id: 99
        }
    );
    assert!(f.repository.is_empty());
    assert!(f.history.rows().is_empty());
    assert!(f.dispatcher.dispatched().is_empty());
}

#[tokio::test]
async fn reassigning_to_a_missing_user_fails_before_any_write() {
    let f = fixture();
    let ticket = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap();
    let input = UpdateTicketInput {
        assigned_to: UserId::new(999),
        ..update_input("in_progress", "high", None)
    };

    let error = f.lifecycle.update(&ctx(), ticket.id, input).await.unwrap_err();

    assert_eq!(
        error,
        Error::NotFound {
            entity: Entity::User,
            id: 999
        }
    );
    let row = f.repository.row(ticket.id).unwrap();
    assert_eq!(row.assigned_to, UserId::new(HANDLER));
    assert_eq!(row.version, ticket.version);
    assert_eq!(f.history.count_for(ticket.id), 1);
}

#[tokio::test]
async fn invalid_input_touches_nothing() {
    let f = fixture();
    let input = CreateTicketInput {
        title: String::new(),
        ..create_input("high")
    };

    let error = f.lifecycle.create(&ctx(), input).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Validation);
    assert_eq!(f.repository.calls(), 0);
}

#[tokio::test]
async fn broker_outage_after_commit_is_a_consistency_gap() {
    let f = fixture();
    f.dispatcher.set_failing(true);

    let error = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap_err();

    let Error::ConsistencyGap { ticket_id, step, .. } = error else {
        panic!("expected a consistency gap, got {error:?}");
    };
    assert_eq!(step, MutationStep::NotificationDispatch);
    // The ticket and its history row stay.
    assert!(f.repository.row(ticket_id).is_some());
    assert_eq!(f.history.count_for(ticket_id), 1);
}

#[tokio::test]
async fn history_failure_stops_before_the_notification() {
    let f = fixture();
    f.history.set_failing(true);

    let error = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap_err();

    assert!(matches!(
        error,
        Error::ConsistencyGap {
            step: MutationStep::HistoryRecord,
            ..
        }
    ));
    assert_eq!(f.repository.len(), 1);
    assert!(f.dispatcher.dispatched().is_empty());
}

#[tokio::test]
async fn store_outage_surfaces_as_transient() {
    let f = fixture();
    f.repository.set_failing(true);

    let error = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::TransientIo);
    assert!(f.history.rows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_expiring_after_commit_leaves_the_ticket_behind() {
    let f = fixture();
    f.repository.set_commit_latency(std::time::Duration::from_secs(10));
    let ctx = RequestContext::with_timeout(
        UserId::new(REPORTER),
        std::time::Duration::from_millis(100),
    );

    let error = f.lifecycle.create(&ctx, create_input("high")).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::TransientIo);
    assert_eq!(f.repository.len(), 1);
    assert!(f.history.rows().is_empty());
    assert!(f.dispatcher.dispatched().is_empty());
}

#[tokio::test]
async fn deleted_ticket_is_not_found() {
    let f = fixture();
    let ticket = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap();

    f.lifecycle.delete(&ctx(), ticket.id).await.unwrap();

    let error = f.lifecycle.find_by_id(&ctx(), ticket.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    let error = f.lifecycle.delete(&ctx(), ticket.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    let error = f
        .lifecycle
        .update(&ctx(), TicketId::new(404), update_input("open", "high", None))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn view_carries_creator_comments_and_no_penalty_when_closed() {
    let f = fixture();
    let ticket = f.lifecycle.create(&ctx(), create_input("high")).await.unwrap();
    f.comments
        .insert(NewComment {
            ticket_id: ticket.id,
            user_id: UserId::new(HANDLER),
            content: "Looking into it".to_string(),
            created_at: f.clock.now(),
        })
        .await
        .unwrap();
    f.lifecycle
        .update(&ctx(), ticket.id, update_input("closed", "high", None))
        .await
        .unwrap();

    f.clock.advance(Duration::days(2));
    let view = f.lifecycle.find_by_id(&ctx(), ticket.id).await.unwrap();

    let creator = view.creator.unwrap();
    assert_eq!(creator.name, "Alice");
    assert_eq!(creator.email, "alice@helpdesk.test");
    assert_eq!(view.comments.len(), 1);
    assert!(view.attachments.is_empty());
    assert!(!view.penalty);
    assert!(view.overdue_by.is_empty());
}

#[tokio::test]
async fn listing_pages_and_validates_the_filter() {
    let f = fixture();
    for _ in 0..3 {
        f.lifecycle.create(&ctx(), create_input("medium")).await.unwrap();
    }

    let first = f.lifecycle.find_all(&ctx(), TicketFilter::new(2, 1)).await.unwrap();
    let second = f.lifecycle.find_all(&ctx(), TicketFilter::new(2, 2)).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert!(first[1].ticket.id < second[0].ticket.id);

    let error = f
        .lifecycle
        .find_all(&ctx(), TicketFilter::new(-1, 1))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);

    let error = f
        .lifecycle
        .find_all(&ctx(), TicketFilter::new(10, i64::MAX))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);
}
