//! Tests for the in-memory store and mirror

#![allow(clippy::unwrap_used)] // Tests can unwrap

use chrono::Duration;
use dojo_scheduler_core::error::StoreError;
use dojo_scheduler_core::legacy::LegacyMirror;
use dojo_scheduler_core::slot::{SlotId, SlotStatus};
use dojo_scheduler_core::store::{PageToken, Precondition, ScanRequest, SlotPatch, SlotStore};
use dojo_scheduler_testing::{InMemoryLegacyMirror, InMemorySlotStore, SlotBuilder, member};

#[tokio::test]
async fn failed_precondition_reports_existence() {
    let store = InMemorySlotStore::new();
    store.insert(SlotBuilder::new("s1").status(SlotStatus::Canceled).build());

    let err = store
        .conditional_update(SlotId::new("s1"), SlotPatch::default(), Precondition::bookable())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::PreconditionFailed {
            id: SlotId::new("s1"),
            exists: true
        }
    );

    let err = store
        .delete(SlotId::new("gone"), Some(Precondition::Exists))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::PreconditionFailed {
            id: SlotId::new("gone"),
            exists: false
        }
    );
    assert_eq!(store.write_attempts(), 2);
}

#[tokio::test]
async fn unguarded_delete_of_missing_record_is_none() {
    let store = InMemorySlotStore::new();
    assert!(store.delete(SlotId::new("nope"), None).await.unwrap().is_none());
}

#[tokio::test]
async fn scan_pages_in_id_order_and_respects_end_time() {
    let store = InMemorySlotStore::new();
    for id in ["a", "b", "c", "d", "e"] {
        store.insert(SlotBuilder::new(id).build());
    }
    let early = SlotBuilder::new("aa").build();
    let cutoff = early.end_time + Duration::minutes(1);
    store.insert(
        SlotBuilder::new("aa")
            .window(early.start_time - Duration::hours(2), early.end_time - Duration::hours(2))
            .build(),
    );

    let mut seen = Vec::new();
    let mut token: Option<PageToken> = None;
    loop {
        let page = store
            .scan(ScanRequest {
                ends_after: Some(cutoff - Duration::hours(1)),
                start_after: token.clone(),
                limit: 2,
            })
            .await
            .unwrap();
        seen.extend(page.slots.into_iter().map(|s| s.id.to_string()));
        match page.next {
            Some(next) => token = Some(PageToken::from_raw(next.as_str())),
            None => break,
        }
    }
    assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn scan_rejects_foreign_tokens() {
    let store = InMemorySlotStore::new();
    let err = store
        .scan(ScanRequest {
            ends_after: None,
            start_after: Some(PageToken::from_raw("%%%")),
            limit: 10,
        })
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::InvalidPageToken);
}

#[tokio::test]
async fn purge_removes_only_expired_records() {
    let store = InMemorySlotStore::new();
    let slot = SlotBuilder::new("old").build();
    let expires = slot.expiration_time.unwrap();
    store.insert(slot);
    store.insert(SlotBuilder::new("new").expires_at(expires + Duration::days(1)).build());

    assert_eq!(store.purge_expired(expires - Duration::seconds(1)).await.unwrap(), 0);
    assert_eq!(store.purge_expired(expires).await.unwrap(), 1);
    assert!(store.snapshot("old").is_none());
    assert!(store.snapshot("new").is_some());
}

#[tokio::test]
async fn injected_failures_surface_as_database_errors() {
    let store = InMemorySlotStore::new();
    store.fail_with(StoreError::Database("connection reset".into()));
    assert!(matches!(
        store.get(SlotId::new("x")).await,
        Err(StoreError::Database(_))
    ));
    store.heal();
    assert!(store.get(SlotId::new("x")).await.unwrap().is_none());
}

#[tokio::test]
async fn mirror_tracks_booking_and_restore() {
    let mirror = InMemoryLegacyMirror::new();
    let bob = member("bob", "1500-1600");
    let booked = SlotBuilder::new("s1")
        .participant(&bob)
        .status(SlotStatus::Booked)
        .build();

    mirror.mirror_booking(&booked).await.unwrap();
    assert_eq!(mirror.meeting("s1").unwrap().participant, "bob");
    assert_eq!(mirror.availability("s1").unwrap().status, SlotStatus::Booked);

    let mut canceled = booked;
    canceled.status = SlotStatus::Canceled;
    mirror.restore_availability(&canceled).await.unwrap();
    assert_eq!(mirror.availability("s1").unwrap().status, SlotStatus::Scheduled);
    assert_eq!(mirror.meeting("s1").unwrap().status, SlotStatus::Canceled);

    mirror.set_failing(true);
    assert!(mirror.restore_availability(&canceled).await.is_err());
}
