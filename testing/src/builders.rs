//! Builders for slots and users in tests.

#![allow(clippy::unwrap_used)] // Hardcoded timestamps always parse
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use dojo_scheduler_core::cohort::{Cohort, SessionType};
use dojo_scheduler_core::gateway::User;
use dojo_scheduler_core::slot::{BROADCAST_OWNER, Retention, Slot, SlotId, SlotKind, SlotStatus};
use std::collections::BTreeMap;

/// A regular member in `cohort`.
#[must_use]
pub fn member(username: &str, cohort: &str) -> User {
    User {
        username: username.to_string(),
        display_name: username.to_string(),
        cohort: Cohort::from(cohort),
        previous_cohort: None,
        is_admin: false,
    }
}

/// A member with the admin capability.
#[must_use]
pub fn admin(username: &str) -> User {
    User {
        is_admin: true,
        ..member(username, "2400+")
    }
}

/// Fluent builder for [`Slot`] records.
///
/// Defaults to a Scheduled 1:1 availability owned by `owner` in cohort
/// `1500-1600`, open 2025-01-01 10:00 to 11:00 UTC for that cohort, offering
/// `CLASSICAL_GAME`.
///
/// # Example
///
/// ```
/// use dojo_scheduler_testing::{SlotBuilder, member};
///
/// let slot = SlotBuilder::new("group")
///     .max_participants(5)
///     .participant(&member("p1", "1500-1600"))
///     .build();
/// assert_eq!(slot.remaining_seats(), 4);
/// ```
#[derive(Clone, Debug)]
pub struct SlotBuilder {
    slot: Slot,
}

impl SlotBuilder {
    /// Start a builder for slot `id`.
    #[must_use]
    pub fn new(id: &str) -> Self {
        let start_time = "2025-01-01T10:00:00Z".parse().unwrap();
        let end_time = "2025-01-01T11:00:00Z".parse().unwrap();
        Self {
            slot: Slot {
                id: SlotId::new(id),
                kind: SlotKind::Availability,
                owner: "owner".to_string(),
                owner_display_name: "owner".to_string(),
                owner_cohort: Some(Cohort::from("1500-1600")),
                title: None,
                start_time,
                end_time,
                booked_start_time: None,
                expiration_time: Some(
                    Retention::default().expiration_for(SlotKind::Availability, end_time),
                ),
                types: vec![SessionType::ClassicalGame],
                booked_type: None,
                cohorts: vec![Cohort::from("1500-1600")],
                status: SlotStatus::Scheduled,
                location: Some("Discord".to_string()),
                description: None,
                max_participants: 1,
                participants: BTreeMap::new(),
                messages: Vec::new(),
            },
        }
    }

    /// Set the owner.
    #[must_use]
    pub fn owner(mut self, owner: &User) -> Self {
        self.slot.owner.clone_from(&owner.username);
        self.slot.owner_display_name.clone_from(&owner.display_name);
        self.slot.owner_cohort = Some(owner.cohort.clone());
        self
    }

    /// Set the kind; broadcast kinds get the broadcast owner and no types.
    #[must_use]
    pub fn kind(mut self, kind: SlotKind) -> Self {
        self.slot.kind = kind;
        if kind.is_broadcast() {
            self.slot.owner = BROADCAST_OWNER.to_string();
            self.slot.owner_display_name = BROADCAST_OWNER.to_string();
            self.slot.owner_cohort = None;
            self.slot.types.clear();
            self.slot.title = Some(format!("{kind} session"));
        }
        self.slot.expiration_time =
            Some(Retention::default().expiration_for(kind, self.slot.end_time));
        self
    }

    /// Set the booking window.
    #[must_use]
    pub fn window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.slot.start_time = start;
        self.slot.end_time = end;
        self.slot.expiration_time = Some(Retention::default().expiration_for(self.slot.kind, end));
        self
    }

    /// Override the expiration time.
    #[must_use]
    pub const fn expires_at(mut self, time: DateTime<Utc>) -> Self {
        self.slot.expiration_time = Some(time);
        self
    }

    /// Set the eligible cohorts.
    #[must_use]
    pub fn cohorts(mut self, cohorts: &[&str]) -> Self {
        self.slot.cohorts = cohorts.iter().map(|c| Cohort::from(*c)).collect();
        self
    }

    /// Set the offered session types.
    #[must_use]
    pub fn types(mut self, types: &[SessionType]) -> Self {
        self.slot.types = types.to_vec();
        self
    }

    /// Set the seat count.
    #[must_use]
    pub const fn max_participants(mut self, max: u32) -> Self {
        self.slot.max_participants = max;
        self
    }

    /// Seat `user`.
    #[must_use]
    pub fn participant(mut self, user: &User) -> Self {
        self.slot
            .participants
            .insert(user.username.clone(), user.as_participant());
        self
    }

    /// Set the status.
    #[must_use]
    pub const fn status(mut self, status: SlotStatus) -> Self {
        self.slot.status = status;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Slot {
        self.slot
    }
}
