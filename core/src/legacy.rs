//! Translation to the legacy availability/meeting pair.
//!
//! Older consumers still read a split representation: the owner's
//! "availability" and, once booked, a "meeting" between owner and participant
//! sharing the availability's id. The engine only ever reasons about the
//! unified [`Slot`]; this module derives the legacy records from it and
//! defines the adapter that writes them.
//!
//! Mirror writes are a second record, so they are never atomic with the slot
//! write. The engine treats them as best-effort and the slot stays
//! authoritative. Divergence lasts until both records expire.

use crate::cohort::{Cohort, SessionType};
use crate::error::StoreError;
use crate::slot::{Slot, SlotId, SlotStatus};
use crate::store::StoreFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Legacy view of the owner's offer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRecord {
    /// Same id as the slot.
    pub id: SlotId,
    /// Owner username.
    pub owner: String,
    /// Owner display name.
    pub owner_display_name: String,
    /// Owner cohort.
    pub owner_cohort: Option<Cohort>,
    /// Earliest start.
    pub start_time: DateTime<Utc>,
    /// Latest start.
    pub end_time: DateTime<Utc>,
    /// Garbage-collection time.
    #[serde(skip)]
    pub expiration_time: Option<DateTime<Utc>>,
    /// Offered session types.
    pub types: Vec<SessionType>,
    /// Eligible cohorts.
    pub cohorts: Vec<Cohort>,
    /// Status as the legacy reader sees it.
    pub status: SlotStatus,
    /// Where the session happens.
    pub location: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Seat count.
    pub max_participants: u32,
    /// Participant usernames.
    pub participants: Vec<String>,
}

impl AvailabilityRecord {
    /// Derive the availability as it looks in `slot`'s current state.
    #[must_use]
    pub fn from_slot(slot: &Slot) -> Self {
        Self {
            id: slot.id.clone(),
            owner: slot.owner.clone(),
            owner_display_name: slot.owner_display_name.clone(),
            owner_cohort: slot.owner_cohort.clone(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            expiration_time: slot.expiration_time,
            types: slot.types.clone(),
            cohorts: slot.cohorts.clone(),
            status: slot.status,
            location: slot.location.clone(),
            description: slot.description.clone(),
            max_participants: slot.max_participants,
            participants: slot.participants.keys().cloned().collect(),
        }
    }

    /// The availability reopened after its meeting was canceled.
    #[must_use]
    pub fn reopened(slot: &Slot) -> Self {
        Self {
            status: SlotStatus::Scheduled,
            participants: Vec::new(),
            ..Self::from_slot(slot)
        }
    }
}

/// Legacy view of a booked one-on-one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRecord {
    /// Same id as the availability it was booked from.
    pub id: SlotId,
    /// Availability owner.
    pub owner: String,
    /// The other party.
    pub participant: String,
    /// Agreed start.
    pub start_time: DateTime<Utc>,
    /// Garbage-collection time.
    #[serde(skip)]
    pub expiration_time: Option<DateTime<Utc>>,
    /// Agreed session type.
    #[serde(rename = "type")]
    pub session_type: Option<SessionType>,
    /// Where the session happens.
    pub location: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Meeting status.
    pub status: SlotStatus,
}

impl MeetingRecord {
    /// Derive the meeting for a booked one-on-one slot. `None` when the slot
    /// has no single participant.
    #[must_use]
    pub fn from_slot(slot: &Slot) -> Option<Self> {
        if !slot.is_one_on_one() {
            return None;
        }
        let participant = slot.participants.keys().next()?.clone();
        Some(Self {
            id: slot.id.clone(),
            owner: slot.owner.clone(),
            participant,
            start_time: slot.booked_start_time.unwrap_or(slot.start_time),
            expiration_time: slot.expiration_time,
            session_type: slot.booked_type,
            location: slot.location.clone(),
            description: slot.description.clone(),
            status: slot.status,
        })
    }
}

/// Writes the legacy pair at the storage boundary.
pub trait LegacyMirror: Send + Sync {
    /// Record the meeting for a freshly booked slot and mark its availability Booked.
    ///
    /// # Errors
    ///
    /// Any write failure. The engine logs it and keeps the booking.
    fn mirror_booking<'a>(&'a self, slot: &'a Slot) -> StoreFuture<'a, ()>;

    /// Revert the availability of a canceled slot to Scheduled and mark its
    /// meeting canceled.
    ///
    /// # Errors
    ///
    /// Any write failure. The engine logs it and keeps the cancellation.
    fn restore_availability<'a>(&'a self, slot: &'a Slot) -> StoreFuture<'a, ()>;
}

/// Convenience for implementations that need to reject a slot without a meeting.
#[must_use]
pub fn missing_meeting(slot: &Slot) -> StoreError {
    StoreError::Serialization(format!("slot {} has no single participant to mirror", slot.id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::slot::{Participant, SlotKind};
    use std::collections::BTreeMap;

    fn booked_slot() -> Slot {
        let mut participants = BTreeMap::new();
        participants.insert(
            "bob".to_string(),
            Participant {
                username: "bob".into(),
                display_name: "Bob".into(),
                cohort: Cohort::from("1500-1600"),
                previous_cohort: None,
            },
        );
        Slot {
            id: SlotId::new("s1"),
            kind: SlotKind::Availability,
            owner: "alice".into(),
            owner_display_name: "Alice".into(),
            owner_cohort: Some(Cohort::from("1500-1600")),
            title: None,
            start_time: "2025-01-01T10:00:00Z".parse().unwrap(),
            end_time: "2025-01-01T11:00:00Z".parse().unwrap(),
            booked_start_time: Some("2025-01-01T10:30:00Z".parse().unwrap()),
            expiration_time: None,
            types: vec![SessionType::ClassicalGame],
            booked_type: Some(SessionType::ClassicalGame),
            cohorts: vec![Cohort::from("1500-1600")],
            status: SlotStatus::Booked,
            location: Some("Discord".into()),
            description: None,
            max_participants: 1,
            participants,
            messages: Vec::new(),
        }
    }

    #[test]
    fn meeting_uses_booked_choices() {
        let slot = booked_slot();
        let meeting = MeetingRecord::from_slot(&slot).unwrap();
        assert_eq!(meeting.participant, "bob");
        assert_eq!(meeting.start_time, slot.booked_start_time.unwrap());
        assert_eq!(meeting.session_type, Some(SessionType::ClassicalGame));
        assert_eq!(meeting.status, SlotStatus::Booked);
    }

    #[test]
    fn reopened_availability_is_scheduled_and_empty() {
        let mut slot = booked_slot();
        slot.status = SlotStatus::Canceled;
        let availability = AvailabilityRecord::reopened(&slot);
        assert_eq!(availability.status, SlotStatus::Scheduled);
        assert!(availability.participants.is_empty());
        assert_eq!(AvailabilityRecord::from_slot(&slot).participants, vec!["bob"]);
    }

    #[test]
    fn group_slots_have_no_meeting() {
        let mut slot = booked_slot();
        slot.max_participants = 4;
        assert!(MeetingRecord::from_slot(&slot).is_none());
    }
}
