//! Property tests for the booking precondition.
//!
//! Applies arbitrary sequences of booking attempts through the same
//! precondition-then-patch step a store performs, and checks that no sequence
//! ever overfills a slot.

#![allow(clippy::unwrap_used)]

use dojo_scheduler_core::cohort::{Cohort, SessionType};
use dojo_scheduler_core::command::{BookCommand, BookRequest, Transition};
use dojo_scheduler_core::gateway::User;
use dojo_scheduler_core::slot::{Slot, SlotId, SlotKind, SlotStatus};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn open_slot(max: u32) -> Slot {
    Slot {
        id: SlotId::new("prop"),
        kind: SlotKind::Availability,
        owner: "owner".into(),
        owner_display_name: "Owner".into(),
        owner_cohort: Some(Cohort::from("1500-1600")),
        title: None,
        start_time: "2025-01-01T10:00:00Z".parse().unwrap(),
        end_time: "2025-01-01T11:00:00Z".parse().unwrap(),
        booked_start_time: None,
        expiration_time: None,
        types: vec![SessionType::OpeningSparring],
        booked_type: None,
        cohorts: vec![Cohort::all()],
        status: SlotStatus::Scheduled,
        location: None,
        description: None,
        max_participants: max,
        participants: BTreeMap::new(),
        messages: Vec::new(),
    }
}

fn user(n: u8) -> User {
    User {
        username: format!("user-{n}"),
        display_name: format!("User {n}"),
        cohort: Cohort::from("1500-1600"),
        previous_cohort: None,
        is_admin: false,
    }
}

proptest! {
    /// Commands prepared against stale snapshots still cannot overfill the record.
    #[test]
    fn participants_never_exceed_capacity(
        max in 1u32..6,
        bookers in prop::collection::vec(0u8..12, 0..40),
    ) {
        let mut stored = open_slot(max);
        let snapshot = stored.clone();

        for n in bookers {
            let prepared = BookCommand::prepare(&snapshot, &user(n), BookRequest::default());
            let Ok(command) = prepared else {
                continue;
            };
            if command.precondition().evaluate(Some(&stored)) {
                command.patch().apply(&mut stored);
            }
            prop_assert!(stored.participant_count() <= stored.max_participants);
        }

        if max == 1 && stored.participant_count() == 1 {
            prop_assert_eq!(stored.status, SlotStatus::Booked);
        } else {
            prop_assert_eq!(stored.status, SlotStatus::Scheduled);
        }
    }
}
