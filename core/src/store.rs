//! Record store contract for slot persistence.
//!
//! The store is a key-value abstraction keyed by [`SlotId`]. Its only
//! concurrency primitive is the [`Precondition`]: a predicate over the stored
//! record that the store evaluates atomically at write time. Two writers racing
//! for the same seat are arbitrated by the store alone. A guard built from a
//! copy read earlier pins every field of that copy the write depends on, so an
//! edit landing in between fails the write instead of being built upon.
//!
//! # Implementations
//!
//! - `PostgresSlotStore` (in `dojo-scheduler-postgres`): renders preconditions
//!   into the `WHERE` clause of a single `UPDATE`/`DELETE`/`INSERT`
//! - `InMemorySlotStore` (in `dojo-scheduler-testing`): evaluates preconditions
//!   under a mutex for fast, deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use dojo_scheduler_core::slot::SlotId;
//! use dojo_scheduler_core::store::{Precondition, SlotPatch, SlotStore};
//! use dojo_scheduler_core::error::StoreError;
//!
//! async fn example<S: SlotStore>(store: &S) -> Result<(), StoreError> {
//!     let id = SlotId::new("slot-123");
//!
//!     // Only succeeds while the slot is open and has a free seat
//!     let updated = store
//!         .conditional_update(id, SlotPatch::default(), Precondition::bookable())
//!         .await?;
//!     println!("{} seats left", updated.remaining_seats());
//!     Ok(())
//! }
//! ```

use crate::cohort::{Cohort, SessionType, cohort_matches};
use crate::error::StoreError;
use crate::slot::{Participant, Slot, SlotId, SlotMessage, SlotStatus};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every store call.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Predicate over the current stored record, evaluated by the store at write time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// The record exists.
    Exists,
    /// The record does not exist.
    Absent,
    /// The record exists and has this status.
    StatusIs(SlotStatus),
    /// The record exists and `size(participants) < maxParticipants`.
    HasCapacity,
    /// The record exists and this user holds a seat.
    HasParticipant(String),
    /// The record exists and this user does not hold a seat.
    LacksParticipant(String),
    /// The record exists and nobody holds a seat.
    NoParticipants,
    /// The record exists and at least one seat is held.
    HasParticipants,
    /// The record exists and is owned by this user.
    OwnerIs(String),
    /// The record exists and seats exactly this many.
    MaxParticipantsIs(u32),
    /// The record exists and spans exactly `[start, end]`.
    WindowIs {
        /// Expected `start_time`.
        start: DateTime<Utc>,
        /// Expected `end_time`.
        end: DateTime<Utc>,
    },
    /// The record exists and offers this session type. An empty type list
    /// offers every type.
    OffersType(SessionType),
    /// The record exists and is open to this cohort, directly or through the
    /// `ALL_COHORTS` wildcard.
    OffersCohort(Cohort),
    /// Every clause holds.
    All(Vec<Precondition>),
    /// At least one clause holds.
    Any(Vec<Precondition>),
}

impl Precondition {
    /// `exists AND status == Scheduled AND size(participants) < maxParticipants`.
    #[must_use]
    pub fn bookable() -> Self {
        Self::All(vec![
            Self::Exists,
            Self::StatusIs(SlotStatus::Scheduled),
            Self::HasCapacity,
        ])
    }

    /// Conjunction of `self` and `other`, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All(mut left), Self::All(right)) => {
                left.extend(right);
                Self::All(left)
            }
            (Self::All(mut left), right) => {
                left.push(right);
                Self::All(left)
            }
            (left, Self::All(mut right)) => {
                right.insert(0, left);
                Self::All(right)
            }
            (left, right) => Self::All(vec![left, right]),
        }
    }

    /// Evaluate against the current record (`None` when absent).
    #[must_use]
    pub fn evaluate(&self, current: Option<&Slot>) -> bool {
        match self {
            Self::Exists => current.is_some(),
            Self::Absent => current.is_none(),
            Self::StatusIs(status) => current.is_some_and(|s| s.status == *status),
            Self::HasCapacity => current.is_some_and(Slot::has_capacity),
            Self::HasParticipant(username) => current.is_some_and(|s| s.has_participant(username)),
            Self::LacksParticipant(username) => {
                current.is_some_and(|s| !s.has_participant(username))
            }
            Self::NoParticipants => current.is_some_and(|s| s.participants.is_empty()),
            Self::HasParticipants => current.is_some_and(|s| !s.participants.is_empty()),
            Self::OwnerIs(owner) => current.is_some_and(|s| s.owner == *owner),
            Self::MaxParticipantsIs(max) => current.is_some_and(|s| s.max_participants == *max),
            Self::WindowIs { start, end } => {
                current.is_some_and(|s| s.start_time == *start && s.end_time == *end)
            }
            Self::OffersType(t) => {
                current.is_some_and(|s| s.types.is_empty() || s.types.contains(t))
            }
            Self::OffersCohort(cohort) => {
                current.is_some_and(|s| cohort_matches(&s.cohorts, cohort))
            }
            Self::All(clauses) => clauses.iter().all(|c| c.evaluate(current)),
            Self::Any(clauses) => clauses.iter().any(|c| c.evaluate(current)),
        }
    }
}

/// Field changes applied atomically together with a precondition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotPatch {
    /// Participant to insert (keyed by username).
    pub add_participant: Option<Participant>,
    /// New status.
    pub status: Option<SlotStatus>,
    /// Start time chosen by a 1:1 booker.
    pub booked_start_time: Option<DateTime<Utc>>,
    /// Session type chosen by a 1:1 booker.
    pub booked_type: Option<SessionType>,
    /// Message appended to the slot's conversation.
    pub add_message: Option<SlotMessage>,
}

impl SlotPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.add_participant.is_none()
            && self.status.is_none()
            && self.booked_start_time.is_none()
            && self.booked_type.is_none()
            && self.add_message.is_none()
    }

    /// Apply the patch to an in-memory record.
    pub fn apply(&self, slot: &mut Slot) {
        if let Some(participant) = &self.add_participant {
            slot.participants
                .insert(participant.username.clone(), participant.clone());
        }
        if let Some(status) = self.status {
            slot.status = status;
        }
        if let Some(time) = self.booked_start_time {
            slot.booked_start_time = Some(time);
        }
        if let Some(booked_type) = self.booked_type {
            slot.booked_type = Some(booked_type);
        }
        if let Some(message) = &self.add_message {
            slot.messages.push(message.clone());
        }
    }
}

/// Opaque pagination cursor. Pass it back exactly as received.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageToken(String);

impl PageToken {
    /// Cursor positioned after `id`.
    #[must_use]
    pub fn after(id: &SlotId) -> Self {
        Self(URL_SAFE_NO_PAD.encode(id.as_str()))
    }

    /// Rebuild a token received from a caller.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The wire form of the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the last id seen.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPageToken`] if the token was not produced by
    /// [`PageToken::after`].
    pub fn last_id(&self) -> Result<SlotId, StoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.0)
            .map_err(|_| StoreError::InvalidPageToken)?;
        let id = String::from_utf8(bytes).map_err(|_| StoreError::InvalidPageToken)?;
        if id.is_empty() {
            return Err(StoreError::InvalidPageToken);
        }
        Ok(SlotId::new(id))
    }
}

/// One page of a scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    /// Records in id order.
    pub slots: Vec<Slot>,
    /// Cursor for the next page; `None` at the end of the table.
    pub next: Option<PageToken>,
}

/// Parameters of a raw store scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanRequest {
    /// Only records whose `end_time >= ends_after`.
    pub ends_after: Option<DateTime<Utc>>,
    /// Resume after this cursor.
    pub start_after: Option<PageToken>,
    /// Maximum number of records examined.
    pub limit: usize,
}

/// Slot persistence with store-evaluated conditional writes.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares one store handle
/// across all concurrent requests.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the engine can hold an `Arc<dyn SlotStore>`.
pub trait SlotStore: Send + Sync {
    /// Fetch a record. A missing record is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// - `Database`/`Serialization`: the read failed
    fn get(&self, id: SlotId) -> StoreFuture<'_, Option<Slot>>;

    /// Write the whole record, optionally guarded by a precondition.
    ///
    /// # Errors
    ///
    /// - `PreconditionFailed`: the guard did not hold; nothing was written
    /// - `Database`/`Serialization`: the write failed
    fn put(&self, slot: Slot, precondition: Option<Precondition>) -> StoreFuture<'_, Slot>;

    /// Delete a record and return what was deleted (`None` if it was already
    /// gone and no precondition was given).
    ///
    /// # Errors
    ///
    /// - `PreconditionFailed`: the guard did not hold; nothing was deleted
    /// - `Database`: the delete failed
    fn delete(
        &self,
        id: SlotId,
        precondition: Option<Precondition>,
    ) -> StoreFuture<'_, Option<Slot>>;

    /// Apply `patch` only if `precondition` holds for the current record, and
    /// return the record as written.
    ///
    /// # Errors
    ///
    /// - `PreconditionFailed`: the guard did not hold (a missing record never
    ///   satisfies a guard that inspects fields)
    /// - `Database`/`Serialization`: the update failed
    fn conditional_update(
        &self,
        id: SlotId,
        patch: SlotPatch,
        precondition: Precondition,
    ) -> StoreFuture<'_, Slot>;

    /// Scan records in id order.
    ///
    /// # Errors
    ///
    /// - `InvalidPageToken`: the cursor was not produced by this store
    /// - `Database`/`Serialization`: the scan failed
    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Page>;

    /// Delete every record whose expiration time is at or before `now`, and
    /// return how many were removed.
    ///
    /// # Errors
    ///
    /// - `Database`: the delete failed
    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::slot::SlotKind;
    use std::collections::BTreeMap;

    fn group_slot(max: u32, taken: &[&str]) -> Slot {
        let participants = taken
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    Participant {
                        username: (*name).to_string(),
                        display_name: (*name).to_string(),
                        cohort: Cohort::from("1500-1600"),
                        previous_cohort: None,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        Slot {
            id: SlotId::new("g1"),
            kind: SlotKind::Availability,
            owner: "owner".to_string(),
            owner_display_name: "Owner".to_string(),
            owner_cohort: Some(Cohort::from("1500-1600")),
            title: None,
            start_time: "2025-01-01T10:00:00Z".parse().unwrap(),
            end_time: "2025-01-01T11:00:00Z".parse().unwrap(),
            booked_start_time: None,
            expiration_time: None,
            types: vec![SessionType::OpeningSparring],
            booked_type: None,
            cohorts: vec![Cohort::from("1500-1600")],
            status: SlotStatus::Scheduled,
            location: None,
            description: None,
            max_participants: max,
            participants,
            messages: Vec::new(),
        }
    }

    #[test]
    fn bookable_requires_existing_open_record_with_a_seat() {
        let pre = Precondition::bookable();
        assert!(!pre.evaluate(None));
        assert!(pre.evaluate(Some(&group_slot(5, &["a", "b", "c", "d"]))));
        assert!(!pre.evaluate(Some(&group_slot(2, &["a", "b"]))));

        let mut canceled = group_slot(5, &[]);
        canceled.status = SlotStatus::Canceled;
        assert!(!pre.evaluate(Some(&canceled)));
    }

    #[test]
    fn absent_or_unbooked_guard() {
        let pre = Precondition::Any(vec![
            Precondition::Absent,
            Precondition::OwnerIs("owner".into()).and(Precondition::NoParticipants),
        ]);
        assert!(pre.evaluate(None));
        assert!(pre.evaluate(Some(&group_slot(2, &[]))));
        assert!(!pre.evaluate(Some(&group_slot(2, &["a"]))));
    }

    #[test]
    fn shape_clauses_pin_the_fields_a_booking_depends_on() {
        let slot = group_slot(1, &[]);

        assert!(Precondition::MaxParticipantsIs(1).evaluate(Some(&slot)));
        assert!(!Precondition::MaxParticipantsIs(3).evaluate(Some(&slot)));
        assert!(!Precondition::MaxParticipantsIs(1).evaluate(None));

        let window = Precondition::WindowIs {
            start: slot.start_time,
            end: slot.end_time,
        };
        assert!(window.evaluate(Some(&slot)));
        let mut moved = slot.clone();
        moved.end_time = "2025-01-01T12:00:00Z".parse().unwrap();
        assert!(!window.evaluate(Some(&moved)));

        assert!(Precondition::OffersType(SessionType::OpeningSparring).evaluate(Some(&slot)));
        assert!(!Precondition::OffersType(SessionType::BookStudy).evaluate(Some(&slot)));
        let mut any_type = slot.clone();
        any_type.types.clear();
        assert!(Precondition::OffersType(SessionType::BookStudy).evaluate(Some(&any_type)));

        assert!(Precondition::OffersCohort(Cohort::from("1500-1600")).evaluate(Some(&slot)));
        assert!(!Precondition::OffersCohort(Cohort::from("0-300")).evaluate(Some(&slot)));
        let mut open = slot;
        open.cohorts = vec![Cohort::all()];
        assert!(Precondition::OffersCohort(Cohort::from("0-300")).evaluate(Some(&open)));
    }

    #[test]
    fn and_flattens_conjunctions() {
        let pre = Precondition::bookable().and(Precondition::NoParticipants);
        match pre {
            Precondition::All(clauses) => assert_eq!(clauses.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn patch_adds_participant_and_flips_status() {
        let mut slot = group_slot(1, &[]);
        let patch = SlotPatch {
            add_participant: Some(Participant {
                username: "bob".into(),
                display_name: "Bob".into(),
                cohort: Cohort::from("1500-1600"),
                previous_cohort: None,
            }),
            status: Some(SlotStatus::Booked),
            booked_start_time: Some(slot.start_time),
            booked_type: Some(SessionType::OpeningSparring),
            add_message: None,
        };
        patch.apply(&mut slot);
        assert!(slot.has_participant("bob"));
        assert_eq!(slot.status, SlotStatus::Booked);
        assert_eq!(slot.booked_type, Some(SessionType::OpeningSparring));
        assert!(SlotPatch::default().is_empty());
    }

    #[test]
    fn messages_need_someone_seated() {
        assert!(!Precondition::HasParticipants.evaluate(None));
        assert!(!Precondition::HasParticipants.evaluate(Some(&group_slot(2, &[]))));
        assert!(Precondition::HasParticipants.evaluate(Some(&group_slot(2, &["a"]))));

        let mut slot = group_slot(2, &["a"]);
        let note = SlotMessage {
            id: "m1".into(),
            owner: "a".into(),
            owner_display_name: "A".into(),
            owner_cohort: Cohort::from("1500-1600"),
            owner_previous_cohort: None,
            created_at: slot.start_time,
            content: "see you there".into(),
        };
        let patch = SlotPatch {
            add_message: Some(note.clone()),
            ..SlotPatch::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut slot);
        patch.apply(&mut slot);
        assert_eq!(slot.messages, vec![note.clone(), note]);
    }

    #[test]
    fn page_tokens_are_opaque_but_decodable() {
        let token = PageToken::after(&SlotId::new("abc-123"));
        assert_ne!(token.as_str(), "abc-123");
        let echoed = PageToken::from_raw(token.as_str());
        assert_eq!(echoed.last_id().unwrap(), SlotId::new("abc-123"));

        assert_eq!(
            PageToken::from_raw("!!not base64!!").last_id(),
            Err(StoreError::InvalidPageToken)
        );
        assert_eq!(PageToken::from_raw("").last_id(), Err(StoreError::InvalidPageToken));
    }
}
