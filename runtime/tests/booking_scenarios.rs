//! End-to-end booking flows through the engine with in-memory collaborators.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{COHORT, Harness, at, one_on_one_draft};
use dojo_scheduler_core::cohort::SessionType;
use dojo_scheduler_core::command::BookRequest;
use dojo_scheduler_core::draft::SlotDraft;
use dojo_scheduler_core::error::{SchedulingError, StoreError};
use dojo_scheduler_core::gateway::{NotificationKind, StatisticKind};
use dojo_scheduler_core::slot::{BROADCAST_OWNER, SlotKind, SlotStatus};
use dojo_scheduler_testing::{SlotBuilder, member};

fn book_at(time: &str, session_type: SessionType) -> BookRequest {
    BookRequest {
        requested_time: Some(at(time)),
        requested_type: Some(session_type),
    }
}

#[tokio::test]
async fn posted_one_on_one_slot_is_booked_at_the_requested_time() {
    let h = Harness::new();
    let posted = h
        .engine
        .create_or_update(one_on_one_draft("owner"), "owner")
        .await
        .unwrap();
    assert_eq!(posted.status, SlotStatus::Scheduled);
    assert_eq!(posted.location.as_deref(), Some("Discord"));

    let booked = h
        .engine
        .book(
            posted.id.as_str(),
            "bob",
            book_at("2025-01-01T10:30:00Z", SessionType::ClassicalGame),
        )
        .await
        .unwrap();

    assert_eq!(booked.status, SlotStatus::Booked);
    assert_eq!(booked.participant_count(), 1);
    assert!(booked.has_participant("bob"));
    assert_eq!(booked.booked_start_time, Some(at("2025-01-01T10:30:00Z")));
    assert_eq!(booked.booked_type, Some(SessionType::ClassicalGame));

    let meeting = h.mirror.meeting(posted.id.as_str()).unwrap();
    assert_eq!(meeting.participant, "bob");

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::SlotBooked);
    assert_eq!(sent[0].target_user, "owner");

    let kinds: Vec<_> = h.stats.recorded().into_iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![StatisticKind::Created, StatisticKind::Booked]);
}

#[tokio::test]
async fn second_booker_of_a_one_on_one_slot_gets_conflict() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());

    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();
    let second = h.engine.book("s1", "carol", BookRequest::default()).await;

    assert!(matches!(second, Err(SchedulingError::Conflict { .. })));
    let stored = h.store.snapshot("s1").unwrap();
    assert_eq!(stored.participant_count(), 1);
    assert!(stored.has_participant("bob"));
}

#[tokio::test]
async fn owner_cannot_book_own_slot_and_nothing_is_written() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());

    let result = h.engine.book("s1", "owner", BookRequest::default()).await;

    assert!(matches!(result, Err(SchedulingError::Authorization(_))));
    assert_eq!(h.store.write_attempts(), 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn participant_cancels_and_mirror_is_restored() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();

    let canceled = h.engine.cancel("s1", "bob").await.unwrap();

    assert_eq!(canceled.status, SlotStatus::Canceled);
    let availability = h.mirror.availability("s1").unwrap();
    assert_eq!(availability.status, SlotStatus::Scheduled);
    assert!(availability.participants.is_empty());
    assert_eq!(h.mirror.meeting("s1").unwrap().status, SlotStatus::Canceled);

    let last = h.notifier.sent().pop().unwrap();
    assert_eq!(last.kind, NotificationKind::SlotCanceled);
    assert_eq!(last.target_user, "owner");
}

#[tokio::test]
async fn cancel_succeeds_when_mirror_revert_fails() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();
    h.mirror.set_failing(true);

    let canceled = h.engine.cancel("s1", "bob").await.unwrap();

    assert_eq!(canceled.status, SlotStatus::Canceled);
    assert_eq!(h.store.snapshot("s1").unwrap().status, SlotStatus::Canceled);
    // The mirror still shows the booking it could not revert
    assert_eq!(
        h.mirror.availability("s1").unwrap().status,
        SlotStatus::Booked
    );
}

#[tokio::test]
async fn owner_cancel_notifies_the_participant() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();

    h.engine.cancel("s1", "owner").await.unwrap();

    let last = h.notifier.sent().pop().unwrap();
    assert_eq!(last.target_user, "bob");
}

#[tokio::test]
async fn outsiders_cannot_cancel() {
    let h = Harness::new();
    h.store.insert(
        SlotBuilder::new("s1")
            .participant(&member("bob", COHORT))
            .status(SlotStatus::Booked)
            .build(),
    );

    let result = h.engine.cancel("s1", "carol").await;

    assert!(matches!(result, Err(SchedulingError::Authorization(_))));
    assert_eq!(h.store.snapshot("s1").unwrap().status, SlotStatus::Booked);
}

#[tokio::test]
async fn group_slots_cannot_be_canceled() {
    let h = Harness::new();
    h.store.insert(
        SlotBuilder::new("g1")
            .max_participants(5)
            .participant(&member("bob", COHORT))
            .build(),
    );

    let result = h.engine.cancel("g1", "bob").await;
    assert!(matches!(result, Err(SchedulingError::Validation(_))));
}

#[tokio::test]
async fn canceled_is_terminal() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();
    h.engine.cancel("s1", "bob").await.unwrap();

    let rebook = h.engine.book("s1", "carol", BookRequest::default()).await;
    let recancel = h.engine.cancel("s1", "bob").await;
    let resave = h
        .engine
        .create_or_update(
            SlotDraft {
                id: Some("s1".into()),
                ..one_on_one_draft("owner")
            },
            "owner",
        )
        .await;

    assert!(matches!(rebook, Err(SchedulingError::Conflict { .. })));
    assert!(matches!(recancel, Err(SchedulingError::Conflict { .. })));
    assert!(matches!(resave, Err(SchedulingError::Conflict { .. })));
    assert_eq!(h.store.snapshot("s1").unwrap().status, SlotStatus::Canceled);
}

#[tokio::test]
async fn booking_requests_are_validated_before_writing() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());

    let wrong_cohort = h.engine.book("s1", "dave", BookRequest::default()).await;
    let too_early = h
        .engine
        .book("s1", "bob", book_at("2025-01-01T09:59:00Z", SessionType::ClassicalGame))
        .await;
    let wrong_type = h
        .engine
        .book("s1", "bob", book_at("2025-01-01T10:15:00Z", SessionType::BookStudy))
        .await;
    let unknown_slot = h.engine.book("nope", "bob", BookRequest::default()).await;
    let unknown_caller = h.engine.book("s1", "mallory", BookRequest::default()).await;

    assert!(matches!(wrong_cohort, Err(SchedulingError::Validation(_))));
    assert!(matches!(too_early, Err(SchedulingError::Validation(_))));
    assert!(matches!(wrong_type, Err(SchedulingError::Validation(_))));
    assert!(matches!(unknown_slot, Err(SchedulingError::NotFound(_))));
    assert!(matches!(unknown_caller, Err(SchedulingError::Authorization(_))));
    assert_eq!(h.store.write_attempts(), 0);
}

#[tokio::test]
async fn booking_defaults_to_window_start_and_first_offered_type() {
    let h = Harness::new();
    h.store.insert(
        SlotBuilder::new("s1")
            .types(&[SessionType::EndgameSparring, SessionType::ClassicalGame])
            .build(),
    );

    let booked = h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();

    assert_eq!(booked.booked_start_time, Some(booked.start_time));
    assert_eq!(booked.booked_type, Some(SessionType::EndgameSparring));
}

#[tokio::test]
async fn slots_with_participants_cannot_be_deleted_by_anyone() {
    let h = Harness::new();
    h.store.insert(
        SlotBuilder::new("s1")
            .participant(&member("bob", COHORT))
            .status(SlotStatus::Booked)
            .build(),
    );

    for caller in ["owner", "bob", "sensei_admin"] {
        let result = h.engine.delete("s1", caller).await;
        assert!(
            matches!(result, Err(SchedulingError::Validation(_))),
            "{caller} got {result:?}"
        );
    }
    assert!(h.store.snapshot("s1").is_some());
    assert_eq!(h.store.write_attempts(), 0);
}

#[tokio::test]
async fn delete_requires_the_right_role() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.store.insert(SlotBuilder::new("dojo").kind(SlotKind::Dojo).max_participants(30).build());

    assert!(matches!(
        h.engine.delete("s1", "bob").await,
        Err(SchedulingError::Authorization(_))
    ));
    assert!(matches!(
        h.engine.delete("dojo", "owner").await,
        Err(SchedulingError::Authorization(_))
    ));

    h.engine.delete("s1", "owner").await.unwrap();
    h.engine.delete("dojo", "sensei_admin").await.unwrap();

    assert!(h.store.is_empty());
    assert!(matches!(
        h.engine.delete("s1", "owner").await,
        Err(SchedulingError::NotFound(_))
    ));
}

#[tokio::test]
async fn saving_the_same_draft_twice_keeps_one_record() {
    let h = Harness::new();
    let draft = SlotDraft {
        id: Some("fixed".into()),
        description: Some("bring a clock".into()),
        ..one_on_one_draft("owner")
    };

    let first = h.engine.create_or_update(draft.clone(), "owner").await.unwrap();
    let second = h.engine.create_or_update(draft, "owner").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn saving_over_someone_elses_slot_is_refused() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("theirs").build());

    let result = h
        .engine
        .create_or_update(
            SlotDraft {
                id: Some("theirs".into()),
                ..one_on_one_draft("bob")
            },
            "bob",
        )
        .await;

    assert!(matches!(result, Err(SchedulingError::Authorization(_))));
    assert_eq!(h.store.snapshot("theirs").unwrap().owner, "owner");
}

#[tokio::test]
async fn booked_slots_cannot_be_edited() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();

    let result = h
        .engine
        .create_or_update(
            SlotDraft {
                id: Some("s1".into()),
                ..one_on_one_draft("owner")
            },
            "owner",
        )
        .await;

    assert!(matches!(result, Err(SchedulingError::Conflict { .. })));
    assert!(h.store.snapshot("s1").unwrap().has_participant("bob"));
}

#[tokio::test]
async fn owner_must_match_caller_on_save() {
    let h = Harness::new();
    let result = h
        .engine
        .create_or_update(one_on_one_draft("owner"), "bob")
        .await;

    assert!(matches!(result, Err(SchedulingError::Authorization(_))));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn admins_post_broadcast_sessions_owned_by_sensei() {
    let h = Harness::new();
    let draft = SlotDraft {
        kind: Some(SlotKind::Dojo),
        title: Some("Endgame lecture".into()),
        max_participants: Some(50),
        types: Vec::new(),
        ..one_on_one_draft("sensei_admin")
    };

    let refused = h.engine.create_or_update(draft.clone(), "bob").await;
    assert!(matches!(refused, Err(SchedulingError::Authorization(_))));

    let posted = h.engine.create_or_update(draft, "sensei_admin").await.unwrap();
    assert_eq!(posted.owner, BROADCAST_OWNER);
    assert_eq!(posted.location.as_deref(), Some("No Location Provided"));

    let booked = h
        .engine
        .book(posted.id.as_str(), "bob", BookRequest::default())
        .await
        .unwrap();
    assert_eq!(booked.status, SlotStatus::Scheduled);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn store_outages_surface_as_transient_errors() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.store.fail_with(StoreError::Database("connection reset".into()));

    let result = h.engine.book("s1", "bob", BookRequest::default()).await;

    let err = result.unwrap_err();
    assert!(matches!(err, SchedulingError::TransientStore(_)));
    assert!(err.is_retryable());

    h.store.heal();
    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();
}

#[tokio::test]
async fn failing_collaborators_never_change_outcomes() {
    let h = Harness::with_failing_collaborators();
    h.store.insert(SlotBuilder::new("s1").build());

    let booked = h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();
    assert_eq!(booked.status, SlotStatus::Booked);

    let canceled = h.engine.cancel("s1", "owner").await.unwrap();
    assert_eq!(canceled.status, SlotStatus::Canceled);

    // Every hook was attempted and failed
    assert_eq!(h.notifier.sent().len(), 2);
    assert_eq!(h.stats.recorded().len(), 2);
    assert!(h.mirror.meeting("s1").is_none());
}

#[tokio::test]
async fn owner_and_participant_share_a_conversation() {
    let h = Harness::new();
    h.store.insert(SlotBuilder::new("s1").build());
    h.engine.book("s1", "bob", BookRequest::default()).await.unwrap();

    h.engine.post_message("s1", "bob", "Looking forward to it").await.unwrap();
    let updated = h.engine.post_message("s1", "owner", "Same here").await.unwrap();

    let thread: Vec<_> = updated
        .messages
        .iter()
        .map(|m| (m.owner.as_str(), m.content.as_str()))
        .collect();
    assert_eq!(
        thread,
        vec![("bob", "Looking forward to it"), ("owner", "Same here")]
    );
    assert_eq!(h.store.snapshot("s1").unwrap().messages.len(), 2);
    // Messages are not transitions: nobody is notified
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn messages_are_refused_for_outsiders_and_empty_slots() {
    let h = Harness::new();
    h.store.insert(
        SlotBuilder::new("s1")
            .participant(&member("bob", COHORT))
            .status(SlotStatus::Booked)
            .build(),
    );
    h.store.insert(SlotBuilder::new("empty").build());

    let outsider = h.engine.post_message("s1", "carol", "hi").await;
    let blank = h.engine.post_message("s1", "bob", "   ").await;
    let unbooked = h.engine.post_message("empty", "owner", "anyone?").await;
    let missing = h.engine.post_message("nope", "bob", "hello?").await;

    assert!(matches!(outsider, Err(SchedulingError::Authorization(_))));
    assert!(matches!(blank, Err(SchedulingError::Validation(_))));
    assert!(matches!(unbooked, Err(SchedulingError::Validation(_))));
    assert!(matches!(missing, Err(SchedulingError::NotFound(_))));
    assert!(h.store.snapshot("s1").unwrap().messages.is_empty());
    assert_eq!(h.store.write_attempts(), 0);
}
