//! In-memory legacy mirror.

use dojo_scheduler_core::error::StoreError;
use dojo_scheduler_core::legacy::{AvailabilityRecord, LegacyMirror, MeetingRecord, missing_meeting};
use dojo_scheduler_core::slot::{Slot, SlotId, SlotStatus};
use dojo_scheduler_core::store::StoreFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// [`LegacyMirror`] keeping the availability/meeting pair in hash maps.
///
/// Call [`set_failing`](Self::set_failing) to make every write fail, which is
/// how tests show that mirror failures never change an engine outcome.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLegacyMirror {
    availabilities: Arc<RwLock<HashMap<SlotId, AvailabilityRecord>>>,
    meetings: Arc<RwLock<HashMap<SlotId, MeetingRecord>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryLegacyMirror {
    /// Create an empty mirror
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mirror whose writes always fail.
    #[must_use]
    pub fn failing() -> Self {
        let mirror = Self::default();
        mirror.set_failing(true);
        mirror
    }

    /// Toggle failure injection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The mirrored availability, if any.
    #[must_use]
    pub fn availability(&self, id: &str) -> Option<AvailabilityRecord> {
        self.availabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&SlotId::new(id))
            .cloned()
    }

    /// The mirrored meeting, if any.
    #[must_use]
    pub fn meeting(&self, id: &str) -> Option<MeetingRecord> {
        self.meetings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&SlotId::new(id))
            .cloned()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Database("legacy mirror unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl LegacyMirror for InMemoryLegacyMirror {
    fn mirror_booking<'a>(&'a self, slot: &'a Slot) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_failure()?;
            let meeting = MeetingRecord::from_slot(slot).ok_or_else(|| missing_meeting(slot))?;
            self.meetings
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(slot.id.clone(), meeting);
            self.availabilities
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(slot.id.clone(), AvailabilityRecord::from_slot(slot));
            Ok(())
        })
    }

    fn restore_availability<'a>(&'a self, slot: &'a Slot) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_failure()?;
            self.availabilities
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(slot.id.clone(), AvailabilityRecord::reopened(slot));
            let mut meetings = self.meetings.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(meeting) = meetings.get_mut(&slot.id) {
                meeting.status = SlotStatus::Canceled;
            }
            Ok(())
        })
    }
}
