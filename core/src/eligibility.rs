//! Who may see and book which slot.
//!
//! Everything here is a pure function of a slot and a caller. The engine uses
//! [`check_bookable`] as a pre-check before issuing a booking write, and
//! [`ListCriteria::matches`] to trim listings down to what the caller could
//! actually act on. Neither replaces the store-side precondition: a slot that
//! passes the pre-check can still be lost to a concurrent booker.

use crate::cohort::{SessionType, cohort_matches};
use crate::gateway::User;
use crate::slot::{Slot, SlotKind, SlotStatus};
use chrono::{DateTime, Utc};
use std::fmt;

/// Why a caller cannot book a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ineligibility {
    /// Owners cannot book their own slot.
    OwnSlot,
    /// The slot is booked or canceled.
    NotScheduled(SlotStatus),
    /// The caller already holds a seat.
    AlreadyParticipant,
    /// The caller's cohort is not offered.
    CohortNotOffered,
    /// Every seat is taken.
    Full,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnSlot => write!(f, "you cannot book your own slot"),
            Self::NotScheduled(status) => write!(f, "slot is {status}"),
            Self::AlreadyParticipant => write!(f, "you already booked this slot"),
            Self::CohortNotOffered => write!(f, "your cohort is not allowed to book this slot"),
            Self::Full => write!(f, "slot is fully booked"),
        }
    }
}

/// Check every eligibility clause, reporting the first that fails.
///
/// # Errors
///
/// Returns the [`Ineligibility`] reason when the caller cannot book.
pub fn check_bookable(slot: &Slot, caller: &User) -> Result<(), Ineligibility> {
    if slot.is_owned_by(&caller.username) {
        return Err(Ineligibility::OwnSlot);
    }
    if slot.status != SlotStatus::Scheduled {
        return Err(Ineligibility::NotScheduled(slot.status));
    }
    if slot.has_participant(&caller.username) {
        return Err(Ineligibility::AlreadyParticipant);
    }
    if !cohort_matches(&slot.cohorts, &caller.cohort) {
        return Err(Ineligibility::CohortNotOffered);
    }
    if !slot.has_capacity() {
        return Err(Ineligibility::Full);
    }
    Ok(())
}

/// `status == Scheduled`, caller is not the owner, caller's cohort is offered,
/// and a seat is free.
#[must_use]
pub fn is_bookable(slot: &Slot, caller: &User) -> bool {
    check_bookable(slot, caller).is_ok()
}

/// Which slots a listing returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListScope {
    /// Slots the caller could book right now.
    #[default]
    Bookable,
    /// Slots the caller owns.
    Owned,
    /// Slots the caller holds a seat in.
    Participating,
    /// Every slot except private availabilities, whoever the caller is.
    Public,
}

/// Filter applied to listings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListCriteria {
    /// Which relationship to the caller is required.
    pub scope: ListScope,
    /// Restrict to these kinds; empty means every kind.
    pub kinds: Vec<SlotKind>,
    /// Restrict to slots offering this session type.
    pub session_type: Option<SessionType>,
    /// Only slots ending at or after this time. The engine defaults it to now.
    pub ends_after: Option<DateTime<Utc>>,
}

impl ListCriteria {
    /// Bookable slots of every kind.
    #[must_use]
    pub fn bookable() -> Self {
        Self::default()
    }

    /// Slots owned by the caller.
    #[must_use]
    pub fn owned() -> Self {
        Self {
            scope: ListScope::Owned,
            ..Self::default()
        }
    }

    /// Slots the caller holds a seat in.
    #[must_use]
    pub fn participating() -> Self {
        Self {
            scope: ListScope::Participating,
            ..Self::default()
        }
    }

    /// Slots anyone may see: every kind except [`SlotKind::Availability`].
    #[must_use]
    pub fn public() -> Self {
        Self {
            scope: ListScope::Public,
            ..Self::default()
        }
    }

    /// Restrict to `kinds`.
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = SlotKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Restrict to slots offering `session_type`.
    #[must_use]
    pub const fn with_session_type(mut self, session_type: SessionType) -> Self {
        self.session_type = Some(session_type);
        self
    }

    /// Only slots ending at or after `time`.
    #[must_use]
    pub const fn ending_after(mut self, time: DateTime<Utc>) -> Self {
        self.ends_after = Some(time);
        self
    }

    /// Whether `slot` belongs in `caller`'s listing.
    #[must_use]
    pub fn matches(&self, slot: &Slot, caller: &User) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&slot.kind) {
            return false;
        }
        if let Some(session_type) = self.session_type {
            if !slot.types.contains(&session_type) {
                return false;
            }
        }
        if let Some(ends_after) = self.ends_after {
            if slot.end_time < ends_after {
                return false;
            }
        }
        match self.scope {
            ListScope::Bookable => is_bookable(slot, caller),
            ListScope::Owned => slot.is_owned_by(&caller.username),
            ListScope::Participating => slot.has_participant(&caller.username),
            ListScope::Public => slot.kind != SlotKind::Availability,
        }
    }
}
