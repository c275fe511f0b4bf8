//! Cache-aside behaviour of `CachedTicketStore`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration;
use helpdesk_core::cache::{listing_key, ticket_key};
use helpdesk_core::environment::Clock;
use helpdesk_core::error::ErrorKind;
use helpdesk_core::input::TicketFilter;
use helpdesk_core::store::{CachedTicketStore, TicketStore};
use helpdesk_core::types::{NewTicket, Priority, TicketChanges, TicketId, TicketStatus, UserId};
use helpdesk_testing::mocks::{ManualClock, test_clock};
use helpdesk_testing::{InMemoryTicketCache, InMemoryTicketRepository};
use std::sync::Arc;

struct Fixture {
    store: CachedTicketStore,
    repository: InMemoryTicketRepository,
    cache: InMemoryTicketCache,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    let clock = ManualClock::new(test_clock().now());
    let repository = InMemoryTicketRepository::new();
    let cache = InMemoryTicketCache::with_clock(Arc::new(clock.clone()));
    let store = CachedTicketStore::new(Arc::new(repository.clone()), Arc::new(cache.clone()));
    Fixture {
        store,
        repository,
        cache,
        clock,
    }
}

fn new_ticket(clock: &ManualClock, title: &str) -> NewTicket {
    let now = clock.now();
    NewTicket {
        title: title.to_string(),
        description: "Screen flickers".to_string(),
        status: TicketStatus::Open,
        priority: Priority::Medium,
        assigned_to: UserId::new(2),
        user_id: UserId::new(1),
        due_by: now + Duration::minutes(90),
        created_at: now,
    }
}

fn changes_for(id: TicketId, clock: &ManualClock, title: &str) -> TicketChanges {
    let now = clock.now();
    TicketChanges {
        id,
        title: title.to_string(),
        description: "Screen flickers".to_string(),
        status: TicketStatus::InProgress,
        priority: Priority::High,
        assigned_to: UserId::new(3),
        due_by: now + Duration::minutes(60),
        updated_at: now,
        expected_version: None,
    }
}

#[tokio::test]
async fn second_read_within_ttl_is_served_from_cache() {
    let f = fixture();
    let created = f.store.create(new_ticket(&f.clock, "Monitor")).await.unwrap();

    let first = f.store.find_by_id(created.id).await.unwrap();
    let calls_after_first = f.repository.calls();

    let second = f.store.find_by_id(created.id).await.unwrap();
    assert_eq!(f.repository.calls(), calls_after_first);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(
        f.cache.raw(&ticket_key(created.id)).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[tokio::test]
async fn entries_expire_after_five_minutes() {
    let f = fixture();
    let created = f.store.create(new_ticket(&f.clock, "Monitor")).await.unwrap();
    f.store.find_by_id(created.id).await.unwrap();
    let calls = f.repository.calls();

    f.clock.advance(Duration::minutes(5));
    f.store.find_by_id(created.id).await.unwrap();
    assert_eq!(f.repository.calls(), calls + 1);
}

#[tokio::test]
async fn update_invalidates_the_cached_ticket() {
    let f = fixture();
    let created = f.store.create(new_ticket(&f.clock, "Before")).await.unwrap();
    f.store.find_by_id(created.id).await.unwrap();

    let updated = f
        .store
        .update(changes_for(created.id, &f.clock, "After"))
        .await
        .unwrap();
    assert_eq!(updated.title, "After");
    assert_eq!(updated.version, 2);
    assert_eq!(updated.user_id, UserId::new(1));

    let read = f.store.find_by_id(created.id).await.unwrap();
    assert_eq!(read.title, "After");
}

#[tokio::test]
async fn listings_are_keyed_per_page_and_dropped_on_write() {
    let f = fixture();
    for i in 0..3 {
        f.store
            .create(new_ticket(&f.clock, &format!("t{i}")))
            .await
            .unwrap();
    }

    let page_one = f.store.find_all(&TicketFilter::new(2, 1)).await.unwrap();
    let page_two = f.store.find_all(&TicketFilter::new(2, 2)).await.unwrap();
    assert_eq!(page_one.len(), 2);
    assert_eq!(page_two.len(), 1);
    assert_ne!(page_one, page_two);
    assert_eq!(f.cache.listing_keys().len(), 2);
    assert!(f.cache.contains(&listing_key(&TicketFilter::new(2, 1))));

    f.store.create(new_ticket(&f.clock, "t3")).await.unwrap();
    assert!(f.cache.listing_keys().is_empty());

    let refreshed = f.store.find_all(&TicketFilter::new(2, 2)).await.unwrap();
    assert_eq!(refreshed.len(), 2);
}

#[tokio::test]
async fn deleted_tickets_are_not_found_even_if_cached() {
    let f = fixture();
    let created = f.store.create(new_ticket(&f.clock, "Gone")).await.unwrap();
    f.store.find_by_id(created.id).await.unwrap();

    let last_state = f.store.delete(created.id, f.clock.now()).await.unwrap();
    assert_eq!(last_state.id, created.id);

    let error = f.store.find_by_id(created.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    let again = f.store.delete(created.id, f.clock.now()).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn cache_outage_degrades_to_store_reads() {
    let f = fixture();
    let created = f.store.create(new_ticket(&f.clock, "Resilient")).await.unwrap();
    f.cache.set_failing(true);

    let read = f.store.find_by_id(created.id).await.unwrap();
    assert_eq!(read.id, created.id);

    let updated = f
        .store
        .update(changes_for(created.id, &f.clock, "Still works"))
        .await
        .unwrap();
    assert_eq!(updated.title, "Still works");
    assert_eq!(f.store.find_all(&TicketFilter::new(10, 1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let f = fixture();
    let created = f.store.create(new_ticket(&f.clock, "Race")).await.unwrap();

    let mut first = changes_for(created.id, &f.clock, "Editor A");
    first.expected_version = Some(1);
    f.store.update(first).await.unwrap();

    let mut second = changes_for(created.id, &f.clock, "Editor B");
    second.expected_version = Some(1);
    let error = f.store.update(second).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Conflict);

    let read = f.store.find_by_id(created.id).await.unwrap();
    assert_eq!(read.title, "Editor A");
}

#[tokio::test]
async fn store_outage_is_transient() {
    let f = fixture();
    f.repository.set_failing(true);

    let error = f.store.find_by_id(TicketId::new(1)).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TransientIo);
    assert!(error.is_retryable());
}

#[tokio::test]
async fn page_far_past_the_end_is_empty() {
    let f = fixture();
    f.store.create(new_ticket(&f.clock, "Only one")).await.unwrap();

    let page = f.store.find_all(&TicketFilter::new(10, i64::MAX)).await.unwrap();

    assert!(page.is_empty());
}
