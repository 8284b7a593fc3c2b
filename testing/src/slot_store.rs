//! In-memory slot store for fast, deterministic tests.
//!
//! Preconditions are evaluated and patches applied under one write lock, so
//! the store arbitrates racing writers exactly like a database evaluating a
//! conditional `UPDATE`. Every write path yields to the scheduler before
//! taking the lock to let concurrent tasks interleave.
//!
//! A poisoned lock is recovered rather than propagated: each write finishes
//! its map operation before the guard drops, so the map stays consistent.

use chrono::{DateTime, Utc};
use dojo_scheduler_core::error::StoreError;
use dojo_scheduler_core::slot::{Slot, SlotId};
use dojo_scheduler_core::store::{
    Page, PageToken, Precondition, ScanRequest, SlotPatch, SlotStore, StoreFuture,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// `BTreeMap`-backed [`SlotStore`].
///
/// # Example
///
/// ```
/// use dojo_scheduler_testing::{InMemorySlotStore, SlotBuilder};
/// use dojo_scheduler_core::store::{Precondition, SlotStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemorySlotStore::new();
/// let slot = SlotBuilder::new("s1").build();
///
/// store.put(slot.clone(), Some(Precondition::Absent)).await?;
/// assert!(store.put(slot, Some(Precondition::Absent)).await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySlotStore {
    slots: Arc<RwLock<BTreeMap<SlotId, Slot>>>,
    write_attempts: Arc<AtomicU64>,
    failure: Arc<RwLock<Option<StoreError>>>,
}

impl InMemorySlotStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a write.
    pub fn insert(&self, slot: Slot) {
        self.write_slots().insert(slot.id.clone(), slot);
    }

    /// Current record, read synchronously.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<Slot> {
        self.read_slots().get(&SlotId::new(id)).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_slots().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_slots().is_empty()
    }

    /// Number of `put`, `delete` and `conditional_update` calls received,
    /// whether or not they succeeded.
    #[must_use]
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `error` until [`heal`](Self::heal).
    pub fn fail_with(&self, error: StoreError) {
        *self.failure.write().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        *self.failure.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match self
            .failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn read_slots(&self) -> RwLockReadGuard<'_, BTreeMap<SlotId, Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, BTreeMap<SlotId, Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(
        id: &SlotId,
        current: Option<&Slot>,
        precondition: Option<&Precondition>,
    ) -> Result<(), StoreError> {
        match precondition {
            Some(p) if !p.evaluate(current) => Err(StoreError::PreconditionFailed {
                id: id.clone(),
                exists: current.is_some(),
            }),
            _ => Ok(()),
        }
    }
}

impl SlotStore for InMemorySlotStore {
    fn get(&self, id: SlotId) -> StoreFuture<'_, Option<Slot>> {
        Box::pin(async move {
            self.check_failure()?;
            Ok(self.read_slots().get(&id).cloned())
        })
    }

    fn put(&self, slot: Slot, precondition: Option<Precondition>) -> StoreFuture<'_, Slot> {
        Box::pin(async move {
            self.write_attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.check_failure()?;

            let mut slots = self.write_slots();
            Self::guard(&slot.id, slots.get(&slot.id), precondition.as_ref())?;
            slots.insert(slot.id.clone(), slot.clone());
            Ok(slot)
        })
    }

    fn delete(
        &self,
        id: SlotId,
        precondition: Option<Precondition>,
    ) -> StoreFuture<'_, Option<Slot>> {
        Box::pin(async move {
            self.write_attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.check_failure()?;

            let mut slots = self.write_slots();
            Self::guard(&id, slots.get(&id), precondition.as_ref())?;
            Ok(slots.remove(&id))
        })
    }

    fn conditional_update(
        &self,
        id: SlotId,
        patch: SlotPatch,
        precondition: Precondition,
    ) -> StoreFuture<'_, Slot> {
        Box::pin(async move {
            self.write_attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.check_failure()?;

            let mut slots = self.write_slots();
            Self::guard(&id, slots.get(&id), Some(&precondition))?;
            let Some(slot) = slots.get_mut(&id) else {
                return Err(StoreError::PreconditionFailed { id, exists: false });
            };
            patch.apply(slot);
            Ok(slot.clone())
        })
    }

    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Page> {
        Box::pin(async move {
            self.check_failure()?;
            let lower = match &request.start_after {
                Some(token) => Bound::Excluded(token.last_id()?),
                None => Bound::Unbounded,
            };

            let slots = self.read_slots();
            let mut matching = slots
                .range((lower, Bound::Unbounded))
                .map(|(_, slot)| slot)
                .filter(|slot| request.ends_after.is_none_or(|t| slot.end_time >= t))
                .take(request.limit.saturating_add(1))
                .cloned()
                .collect::<Vec<_>>();

            let next = if matching.len() > request.limit {
                matching.truncate(request.limit);
                matching.last().map(|slot| PageToken::after(&slot.id))
            } else {
                None
            };
            Ok(Page {
                slots: matching,
                next,
            })
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.check_failure()?;
            let mut slots = self.write_slots();
            let before = slots.len();
            slots.retain(|_, slot| !slot.is_expired_at(now));
            Ok(u64::try_from(before - slots.len()).unwrap_or(u64::MAX))
        })
    }
}
