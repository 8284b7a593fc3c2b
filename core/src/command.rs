//! Typed commands, one per state transition.
//!
//! Each command is prepared from a snapshot of the slot and the caller, which
//! is where the legality rules of the state machine live. A prepared command
//! knows the [`Precondition`] the store must evaluate at write time and, where
//! it mutates fields, the [`SlotPatch`] to apply. Preparing never touches the
//! store, so every rule here is testable on plain values.
//!
//! The snapshot only decides whether a write is worth attempting. The store's
//! evaluation of [`Transition::precondition`] decides whether it wins.

use crate::cohort::SessionType;
use crate::eligibility::{Ineligibility, check_bookable};
use crate::error::SchedulingError;
use crate::gateway::User;
use crate::slot::{Slot, SlotId, SlotMessage, SlotStatus};
use crate::store::{Precondition, SlotPatch};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A prepared transition against one slot record.
pub trait Transition {
    /// Stable name used in logs and metric labels.
    const NAME: &'static str;

    /// The record the transition writes.
    fn slot_id(&self) -> &SlotId;

    /// Predicate the store evaluates atomically with the write.
    fn precondition(&self) -> Precondition;
}

/// Choices a booker may make on a one-on-one slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BookRequest {
    /// Preferred start; must fall within `[start_time, end_time]`.
    pub requested_time: Option<DateTime<Utc>>,
    /// Preferred session type; must be one the owner offers.
    pub requested_type: Option<SessionType>,
}

/// Claim one seat in a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookCommand {
    id: SlotId,
    booker: String,
    patch: SlotPatch,
    pinned: Precondition,
}

impl BookCommand {
    /// Check `caller` against `slot` and build the booking write.
    ///
    /// # Errors
    ///
    /// - `Authorization`: the caller owns the slot
    /// - `Validation`: cohort not offered, requested type not offered, requested
    ///   time outside the window, or the caller already holds a seat
    /// - `Conflict`: the snapshot is already booked, canceled or full
    pub fn prepare(
        slot: &Slot,
        caller: &User,
        request: BookRequest,
    ) -> Result<Self, SchedulingError> {
        check_bookable(slot, caller).map_err(|reason| match reason {
            Ineligibility::OwnSlot => SchedulingError::authorization(reason.to_string()),
            Ineligibility::CohortNotOffered | Ineligibility::AlreadyParticipant => {
                SchedulingError::validation(reason.to_string())
            }
            Ineligibility::NotScheduled(_) | Ineligibility::Full => {
                SchedulingError::conflict(&slot.id, reason.to_string())
            }
        })?;

        if let Some(time) = request.requested_time {
            if !slot.contains_time(time) {
                return Err(SchedulingError::validation(format!(
                    "requested time {time} is outside {} to {}",
                    slot.start_time, slot.end_time
                )));
            }
        }

        let mut patch = SlotPatch {
            add_participant: Some(caller.as_participant()),
            ..SlotPatch::default()
        };

        if slot.is_one_on_one() {
            let booked_type = match request.requested_type {
                Some(t) if !slot.types.is_empty() && !slot.types.contains(&t) => {
                    return Err(SchedulingError::validation(format!(
                        "type {t} is not offered by this slot"
                    )));
                }
                Some(t) => Some(t),
                None => slot.types.first().copied(),
            };
            patch.status = Some(SlotStatus::Booked);
            patch.booked_start_time = Some(request.requested_time.unwrap_or(slot.start_time));
            patch.booked_type = booked_type;
        }

        // Everything the checks above read from the snapshot
        let mut pinned = vec![
            Precondition::MaxParticipantsIs(slot.max_participants),
            Precondition::OffersCohort(caller.cohort.clone()),
        ];
        if slot.is_one_on_one() || request.requested_time.is_some() {
            pinned.push(Precondition::WindowIs {
                start: slot.start_time,
                end: slot.end_time,
            });
        }
        if let Some(t) = patch.booked_type {
            pinned.push(Precondition::OffersType(t));
        }

        Ok(Self {
            id: slot.id.clone(),
            booker: caller.username.clone(),
            patch,
            pinned: Precondition::All(pinned),
        })
    }

    /// Fields written on success.
    #[must_use]
    pub const fn patch(&self) -> &SlotPatch {
        &self.patch
    }

    /// Username taking the seat.
    #[must_use]
    pub fn booker(&self) -> &str {
        &self.booker
    }

    /// Consume the command, yielding the patch.
    #[must_use]
    pub fn into_patch(self) -> SlotPatch {
        self.patch
    }
}

impl Transition for BookCommand {
    const NAME: &'static str = "book";

    fn slot_id(&self) -> &SlotId {
        &self.id
    }

    fn precondition(&self) -> Precondition {
        Precondition::bookable()
            .and(Precondition::LacksParticipant(self.booker.clone()))
            .and(self.pinned.clone())
    }
}

/// Cancel the booking of a one-on-one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelCommand {
    id: SlotId,
    owner: String,
    participant: String,
    canceled_by: String,
}

impl CancelCommand {
    /// Check that `caller` may cancel `slot`.
    ///
    /// # Errors
    ///
    /// - `Validation`: not a one-on-one slot, or it has no single booking
    /// - `Authorization`: caller is neither the owner nor the participant
    /// - `Conflict`: already canceled
    pub fn prepare(slot: &Slot, caller: &User) -> Result<Self, SchedulingError> {
        if !slot.is_one_on_one() {
            return Err(SchedulingError::validation(
                "only one-on-one bookings can be canceled",
            ));
        }
        if slot.status == SlotStatus::Canceled {
            return Err(SchedulingError::conflict(&slot.id, "slot is already canceled"));
        }
        let mut participants = slot.participants.keys();
        let participant = match (participants.next(), participants.next()) {
            (Some(p), None) => p.clone(),
            _ => {
                return Err(SchedulingError::validation(
                    "slot does not have exactly one participant",
                ));
            }
        };
        if !slot.is_owned_by(&caller.username) && participant != caller.username {
            return Err(SchedulingError::authorization(
                "only the owner or the participant can cancel",
            ));
        }
        Ok(Self {
            id: slot.id.clone(),
            owner: slot.owner.clone(),
            participant,
            canceled_by: caller.username.clone(),
        })
    }

    /// Fields written on success.
    #[must_use]
    pub fn patch(&self) -> SlotPatch {
        SlotPatch {
            status: Some(SlotStatus::Canceled),
            ..SlotPatch::default()
        }
    }

    /// The party that did not cancel, who should hear about it.
    #[must_use]
    pub fn counterpart(&self) -> &str {
        if self.canceled_by == self.owner {
            &self.participant
        } else {
            &self.owner
        }
    }

    /// The participant whose booking is canceled.
    #[must_use]
    pub fn participant(&self) -> &str {
        &self.participant
    }
}

impl Transition for CancelCommand {
    const NAME: &'static str = "cancel";

    fn slot_id(&self) -> &SlotId {
        &self.id
    }

    fn precondition(&self) -> Precondition {
        Precondition::All(vec![
            Precondition::Exists,
            Precondition::StatusIs(SlotStatus::Booked),
            Precondition::HasParticipant(self.participant.clone()),
        ])
    }
}

/// Remove a slot nobody has booked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteCommand {
    id: SlotId,
}

impl DeleteCommand {
    /// Check that `caller` may delete `slot`.
    ///
    /// Participants are checked before the role, so no caller can delete a
    /// booked slot regardless of their capabilities.
    ///
    /// # Errors
    ///
    /// - `Validation`: the slot has participants
    /// - `Authorization`: not the owner, or a broadcast slot without admin
    pub fn prepare(slot: &Slot, caller: &User) -> Result<Self, SchedulingError> {
        if !slot.participants.is_empty() {
            return Err(SchedulingError::validation(
                "slot has participants; cancel the booking first",
            ));
        }
        if slot.kind.is_broadcast() {
            if !caller.is_admin {
                return Err(SchedulingError::authorization(format!(
                    "only admins can delete {} events",
                    slot.kind
                )));
            }
        } else if !slot.is_owned_by(&caller.username) {
            return Err(SchedulingError::authorization("only the owner can delete"));
        }
        Ok(Self { id: slot.id.clone() })
    }
}

impl Transition for DeleteCommand {
    const NAME: &'static str = "delete";

    fn slot_id(&self) -> &SlotId {
        &self.id
    }

    fn precondition(&self) -> Precondition {
        Precondition::All(vec![Precondition::Exists, Precondition::NoParticipants])
    }
}

/// Append a message to a slot's conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCommand {
    id: SlotId,
    author: String,
    message: SlotMessage,
}

impl MessageCommand {
    /// Check that `caller` may post `content` on `slot` at `now`.
    ///
    /// The conversation opens once somebody holds a seat. Until then the slot
    /// may still be replaced by its owner, which would drop any messages.
    ///
    /// # Errors
    ///
    /// - `Validation`: blank content, or nobody has booked the slot yet
    /// - `Authorization`: caller is neither the owner nor a participant
    pub fn prepare(
        slot: &Slot,
        caller: &User,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, SchedulingError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SchedulingError::validation("message content is required"));
        }
        if !slot.is_owned_by(&caller.username) && !slot.has_participant(&caller.username) {
            return Err(SchedulingError::authorization(
                "only the owner or a participant can post messages",
            ));
        }
        if slot.participants.is_empty() {
            return Err(SchedulingError::validation(
                "messages open once the slot has a participant",
            ));
        }
        Ok(Self {
            id: slot.id.clone(),
            author: caller.username.clone(),
            message: SlotMessage {
                id: Uuid::new_v4().to_string(),
                owner: caller.username.clone(),
                owner_display_name: caller.display_name.clone(),
                owner_cohort: caller.cohort.clone(),
                owner_previous_cohort: caller.previous_cohort.clone(),
                created_at: now,
                content: content.to_string(),
            },
        })
    }

    /// The message to append.
    #[must_use]
    pub const fn message(&self) -> &SlotMessage {
        &self.message
    }

    /// Fields written on success.
    #[must_use]
    pub fn patch(&self) -> SlotPatch {
        SlotPatch {
            add_message: Some(self.message.clone()),
            ..SlotPatch::default()
        }
    }
}

impl Transition for MessageCommand {
    const NAME: &'static str = "message";

    fn slot_id(&self) -> &SlotId {
        &self.id
    }

    fn precondition(&self) -> Precondition {
        Precondition::All(vec![
            Precondition::HasParticipants,
            Precondition::Any(vec![
                Precondition::OwnerIs(self.author.clone()),
                Precondition::HasParticipant(self.author.clone()),
            ]),
        ])
    }
}

/// Create a slot, or replace one its owner has not had booked yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveCommand {
    slot: Slot,
}

impl SaveCommand {
    /// Wrap a validated slot (see [`SlotDraft::into_slot`](crate::draft::SlotDraft::into_slot)).
    #[must_use]
    pub const fn new(slot: Slot) -> Self {
        Self { slot }
    }

    /// Check the new record against what is stored under the same id.
    ///
    /// # Errors
    ///
    /// - `Authorization`: the stored record belongs to someone else
    /// - `Conflict`: the stored record is no longer open or has participants
    pub fn check_existing(&self, existing: Option<&Slot>) -> Result<(), SchedulingError> {
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.owner != self.slot.owner {
            return Err(SchedulingError::authorization(
                "slot belongs to another owner",
            ));
        }
        if existing.status != SlotStatus::Scheduled || !existing.participants.is_empty() {
            return Err(SchedulingError::conflict(
                &existing.id,
                "slot has already been booked or canceled",
            ));
        }
        Ok(())
    }

    /// The record to write.
    #[must_use]
    pub const fn slot(&self) -> &Slot {
        &self.slot
    }

    /// Consume the command, yielding the record.
    #[must_use]
    pub fn into_slot(self) -> Slot {
        self.slot
    }
}

impl Transition for SaveCommand {
    const NAME: &'static str = "save";

    fn slot_id(&self) -> &SlotId {
        &self.slot.id
    }

    fn precondition(&self) -> Precondition {
        Precondition::Any(vec![
            Precondition::Absent,
            Precondition::All(vec![
                Precondition::OwnerIs(self.slot.owner.clone()),
                Precondition::StatusIs(SlotStatus::Scheduled),
                Precondition::NoParticipants,
            ]),
        ])
    }
}
