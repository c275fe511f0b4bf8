//! Comments, attachments and session resolution.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration;
use helpdesk::attachments::AttachmentService;
use helpdesk::comments::CommentService;
use helpdesk::sessions::SessionResolver;
use helpdesk_core::environment::{Clock, RequestContext};
use helpdesk_core::error::ErrorKind;
use helpdesk_core::input::{CreateAttachmentInput, CreateCommentInput, UpdateCommentInput};
use helpdesk_core::store::{CachedTicketStore, TicketStore};
use helpdesk_core::types::{NewTicket, Priority, Ticket, TicketId, TicketStatus, UserId};
use helpdesk_core::validation::InputValidator;
use helpdesk_testing::mocks::{ManualClock, test_clock};
use helpdesk_testing::{
    InMemoryAttachmentRepository, InMemoryCommentRepository, InMemoryTicketCache,
    InMemoryTicketRepository, InMemoryUserDirectory,
};
use std::sync::Arc;

const AUTHOR: i64 = 1;
const OTHER: i64 = 2;

struct Fixture {
    comments: CommentService,
    attachments: AttachmentService,
    tickets: Arc<dyn TicketStore>,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    let clock = ManualClock::new(test_clock().now());
    let tickets: Arc<dyn TicketStore> = Arc::new(CachedTicketStore::new(
        Arc::new(InMemoryTicketRepository::new()),
        Arc::new(InMemoryTicketCache::with_clock(Arc::new(clock.clone()))),
    ));
    let validator = Arc::new(InputValidator::new());

    Fixture {
        comments: CommentService::new(
            Arc::new(InMemoryCommentRepository::new()),
            Arc::clone(&tickets),
            validator.clone(),
            Arc::new(clock.clone()),
        ),
        attachments: AttachmentService::new(
            Arc::new(InMemoryAttachmentRepository::new()),
            Arc::clone(&tickets),
            validator,
            Arc::new(clock.clone()),
        ),
        tickets,
        clock,
    }
}

impl Fixture {
    async fn ticket(&self) -> Ticket {
        let now = self.clock.now();
        self.tickets
            .create(NewTicket {
                title: "Printer jam".to_string(),
                description: "Tray 2".to_string(),
                status: TicketStatus::Open,
                priority: Priority::Low,
                assigned_to: UserId::new(OTHER),
                user_id: UserId::new(AUTHOR),
                due_by: now + Duration::minutes(120),
                created_at: now,
            })
            .await
            .unwrap()
    }
}

fn as_user(id: i64) -> RequestContext {
    RequestContext::new(UserId::new(id))
}

fn body(content: &str) -> UpdateCommentInput {
    UpdateCommentInput {
        content: content.to_string(),
    }
}

#[tokio::test]
async fn author_can_edit_and_delete_their_comment() {
    let f = fixture();
    let ticket = f.ticket().await;

    let comment = f
        .comments
        .create(
            &as_user(AUTHOR),
            CreateCommentInput {
                ticket_id: ticket.id,
                content: "Tried turning it off and on".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(comment.user_id, UserId::new(AUTHOR));

    f.clock.advance(Duration::minutes(5));
    let edited = f
        .comments
        .update(&as_user(AUTHOR), comment.id, body("Still jammed"))
        .await
        .unwrap();
    assert_eq!(edited.content, "Still jammed");
    assert_eq!(edited.updated_at, f.clock.now());

    f.comments.delete(&as_user(AUTHOR), comment.id).await.unwrap();

    let error = f
        .comments
        .find_by_id(&as_user(AUTHOR), comment.id)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert!(f.comments.list(&as_user(AUTHOR), ticket.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_the_author_may_change_a_comment() {
    let f = fixture();
    let ticket = f.ticket().await;
    let comment = f
        .comments
        .create(
            &as_user(AUTHOR),
            CreateCommentInput {
                ticket_id: ticket.id,
                content: "Mine".to_string(),
            },
        )
        .await
        .unwrap();

    let error = f
        .comments
        .update(&as_user(OTHER), comment.id, body("Hijacked"))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Authorization);

    let error = f.comments.delete(&as_user(OTHER), comment.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Authorization);

    let kept = f.comments.find_by_id(&as_user(OTHER), comment.id).await.unwrap();
    assert_eq!(kept.content, "Mine");
}

#[tokio::test]
async fn comments_need_a_live_ticket_and_a_body() {
    let f = fixture();

    let error = f
        .comments
        .create(
            &as_user(AUTHOR),
            CreateCommentInput {
                ticket_id: TicketId::new(404),
                content: "Hello?".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    let ticket = f.ticket().await;
    let error = f
        .comments
        .create(
            &as_user(AUTHOR),
            CreateCommentInput {
                ticket_id: ticket.id,
                content: "   ".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn attachments_are_listed_oldest_first() {
    let f = fixture();
    let ticket = f.ticket().await;

    for path in ["uploads/photo.jpg", "uploads/log.txt"] {
        f.attachments
            .create(
                &as_user(AUTHOR),
                CreateAttachmentInput {
                    ticket_id: ticket.id,
                    file_path: path.to_string(),
                },
            )
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(1));
    }

    let listed = f
        .attachments
        .list_by_ticket(&as_user(AUTHOR), ticket.id)
        .await
        .unwrap();
    let paths: Vec<_> = listed.iter().map(|a| a.file_path.as_str()).collect();
    assert_eq!(paths, vec!["uploads/photo.jpg", "uploads/log.txt"]);
}

#[tokio::test]
async fn attachments_require_a_live_ticket() {
    let f = fixture();
    let ticket = f.ticket().await;
    f.tickets.delete(ticket.id, f.clock.now()).await.unwrap();

    let error = f
        .attachments
        .create(
            &as_user(AUTHOR),
            CreateAttachmentInput {
                ticket_id: ticket.id,
                file_path: "uploads/photo.jpg".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn sessions_resolve_until_they_expire() {
    let clock = ManualClock::new(test_clock().now());
    let directory = InMemoryUserDirectory::new();
    directory.add_user(AUTHOR, "Alice");
    directory.add_session(UserId::new(AUTHOR), "token-1", clock.now() + Duration::hours(1));

    let resolver = SessionResolver::new(
        Arc::new(directory),
        Arc::new(clock.clone()),
        std::time::Duration::from_secs(5),
    );

    let ctx = resolver.resolve("token-1").await.unwrap();
    assert_eq!(ctx.acting_user(), UserId::new(AUTHOR));
    assert!(ctx.deadline().is_some());

    let error = resolver.resolve("unknown").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Authorization);
    let error = resolver.resolve("").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Authorization);

    clock.advance(Duration::hours(1));
    let error = resolver.resolve("token-1").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Authorization);
}
