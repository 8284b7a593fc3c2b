//! The scheduling engine.
//!
//! Every operation follows the same shape: resolve the caller, read the slot,
//! prepare a typed command from that snapshot (rejecting illegal requests
//! before any write), issue exactly one conditional write, then run the
//! post-commit hooks. The engine holds no locks and never retries; the store's
//! evaluation of the command's precondition is the only arbiter between
//! concurrent callers.

use crate::config::EngineConfig;
use crate::health::{HealthCheck, HealthStatus};
use crate::hooks::{
    Committed, LegacyMirrorHook, NotificationHook, PostCommitHook, StatisticsHook, TransitionKind,
    run_hooks,
};
use crate::metrics::{BookingOutcome, SchedulerMetrics};
use dojo_scheduler_core::command::{
    BookCommand, BookRequest, CancelCommand, DeleteCommand, MessageCommand, SaveCommand,
    Transition,
};
use dojo_scheduler_core::draft::SlotDraft;
use dojo_scheduler_core::eligibility::ListCriteria;
use dojo_scheduler_core::environment::{Clock, SystemClock};
use dojo_scheduler_core::error::SchedulingError;
use dojo_scheduler_core::gateway::{NotificationGateway, StatisticsRecorder, User, UserGetter};
use dojo_scheduler_core::legacy::LegacyMirror;
use dojo_scheduler_core::slot::{Slot, SlotId};
use dojo_scheduler_core::store::{Page, PageToken, ScanRequest, SlotStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Missing dependencies reported by [`SchedulingEngineBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineBuildError {
    /// No slot store was provided.
    #[error("a slot store is required")]
    MissingStore,
    /// No identity lookup was provided.
    #[error("a user getter is required")]
    MissingUserGetter,
}

/// Orchestrates creation, booking, cancellation, deletion and listing of slots.
///
/// Cheap to clone; clones share the same store and collaborators.
#[derive(Clone)]
pub struct SchedulingEngine {
    store: Arc<dyn SlotStore>,
    users: Arc<dyn UserGetter>,
    clock: Arc<dyn Clock>,
    hooks: Arc<[Arc<dyn PostCommitHook>]>,
    config: EngineConfig,
}

impl std::fmt::Debug for SchedulingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingEngine")
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SchedulingEngine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> SchedulingEngineBuilder {
        SchedulingEngineBuilder::default()
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a slot, or update one the caller owns that nobody has booked.
    ///
    /// # Errors
    ///
    /// - `Validation`: malformed payload
    /// - `Authorization`: owner is not the caller, broadcast kind without
    ///   admin, or the id belongs to another owner
    /// - `Conflict`: the existing record was booked or canceled
    /// - `TransientStore`: infrastructure failure
    #[tracing::instrument(
        skip(self, draft),
        fields(slot_id = draft.id.as_deref().unwrap_or("<new>"))
    )]
    pub async fn create_or_update(
        &self,
        draft: SlotDraft,
        caller: &str,
    ) -> Result<Slot, SchedulingError> {
        timed(SaveCommand::NAME, async {
            let user = self.caller(caller).await?;
            let updating = draft.id.as_deref().is_some_and(|id| !id.is_empty());
            let command = SaveCommand::new(draft.into_slot(&user, &self.config.retention)?);

            if updating {
                let existing = self.read(command.slot_id()).await?;
                command.check_existing(existing.as_ref())?;
            }

            let saved = self
                .store
                .put(command.slot().clone(), Some(command.precondition()))
                .await
                .map_err(|e| {
                    SchedulingError::from_store(e, "slot was booked or changed while saving")
                })?;

            tracing::info!(slot_id = %saved.id, kind = %saved.kind, "Slot saved");
            self.after_commit(TransitionKind::Saved, saved.clone(), user, None).await;
            Ok(saved)
        })
        .await
    }

    /// Claim a seat in slot `id` for `caller`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown slot
    /// - `Authorization`: caller owns the slot
    /// - `Validation`: cohort not offered, type not offered, time outside the window
    /// - `Conflict`: no seat left, slot booked or canceled, or a concurrent booker won
    /// - `TransientStore`: infrastructure failure
    #[tracing::instrument(skip(self, request))]
    pub async fn book(
        &self,
        id: &str,
        caller: &str,
        request: BookRequest,
    ) -> Result<Slot, SchedulingError> {
        timed(BookCommand::NAME, async {
            let result = self.try_book(SlotId::new(id), caller, request).await;
            SchedulerMetrics::record_booking(match &result {
                Ok(_) => BookingOutcome::Success,
                Err(SchedulingError::Conflict { .. }) => BookingOutcome::Conflict,
                Err(SchedulingError::TransientStore(_)) => BookingOutcome::Error,
                Err(_) => BookingOutcome::Rejected,
            });
            result
        })
        .await
    }

    async fn try_book(
        &self,
        id: SlotId,
        caller: &str,
        request: BookRequest,
    ) -> Result<Slot, SchedulingError> {
        let user = self.caller(caller).await?;
        let slot = self.fetch(&id).await?;
        let command = BookCommand::prepare(&slot, &user, request)?;
        let precondition = command.precondition();

        let updated = self
            .store
            .conditional_update(id, command.into_patch(), precondition)
            .await
            .map_err(|e| {
                let error = SchedulingError::from_booking_store(e);
                if matches!(error, SchedulingError::Conflict { .. }) {
                    tracing::debug!("Lost booking race");
                }
                error
            })?;

        tracing::info!(
            participants = updated.participant_count(),
            status = %updated.status,
            "Slot booked"
        );
        let notify = (!updated.kind.is_broadcast()).then(|| updated.owner.clone());
        self.after_commit(TransitionKind::Booked, updated.clone(), user, notify)
            .await;
        Ok(updated)
    }

    /// Cancel the booking of one-on-one slot `id`.
    ///
    /// The slot becomes Canceled; the legacy availability is reopened on a
    /// best-effort basis.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown slot, or it vanished before the write
    /// - `Validation`: not a one-on-one slot with a single booking
    /// - `Authorization`: caller is neither owner nor participant
    /// - `Conflict`: already canceled, or changed before the write
    /// - `TransientStore`: infrastructure failure
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: &str, caller: &str) -> Result<Slot, SchedulingError> {
        timed(CancelCommand::NAME, async {
            let id = SlotId::new(id);
            let user = self.caller(caller).await?;
            let slot = self.fetch(&id).await?;
            let command = CancelCommand::prepare(&slot, &user)?;

            let canceled = self
                .store
                .conditional_update(id, command.patch(), command.precondition())
                .await
                .map_err(|e| {
                    SchedulingError::from_store(e, "booking changed before it could be canceled")
                })?;

            tracing::info!(participant = command.participant(), "Booking canceled");
            let notify = Some(command.counterpart().to_string());
            self.after_commit(TransitionKind::Canceled, canceled.clone(), user, notify)
                .await;
            Ok(canceled)
        })
        .await
    }

    /// Delete slot `id`, which must have no participants.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown slot, or it vanished before the write
    /// - `Validation`: the slot has participants
    /// - `Authorization`: not the owner, or a broadcast slot without admin
    /// - `Conflict`: booked before the write
    /// - `TransientStore`: infrastructure failure
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str, caller: &str) -> Result<(), SchedulingError> {
        timed(DeleteCommand::NAME, async {
            let id = SlotId::new(id);
            let user = self.caller(caller).await?;
            let slot = self.fetch(&id).await?;
            let command = DeleteCommand::prepare(&slot, &user)?;

            let deleted = self
                .store
                .delete(id.clone(), Some(command.precondition()))
                .await
                .map_err(|e| {
                    SchedulingError::from_store(e, "slot was booked before it could be deleted")
                })?
                .ok_or(SchedulingError::NotFound(id))?;

            tracing::info!("Slot deleted");
            self.after_commit(TransitionKind::Deleted, deleted, user, None).await;
            Ok(())
        })
        .await
    }

    /// Post `content` on slot `id` as `caller`.
    ///
    /// Only the owner and participants may post, and only once the slot has
    /// at least one participant. Messages run no post-commit hooks.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown slot, or it vanished before the write
    /// - `Validation`: blank content, or nobody has booked the slot yet
    /// - `Authorization`: caller is neither owner nor participant
    /// - `TransientStore`: infrastructure failure
    #[tracing::instrument(skip(self, content))]
    pub async fn post_message(
        &self,
        id: &str,
        caller: &str,
        content: &str,
    ) -> Result<Slot, SchedulingError> {
        timed(MessageCommand::NAME, async {
            let id = SlotId::new(id);
            let user = self.caller(caller).await?;
            let slot = self.fetch(&id).await?;
            let command = MessageCommand::prepare(&slot, &user, content, self.clock.now())?;

            let updated = self
                .store
                .conditional_update(id, command.patch(), command.precondition())
                .await
                .map_err(|e| {
                    SchedulingError::from_store(e, "slot changed before the message was posted")
                })?;

            tracing::info!(message_id = %command.message().id, "Message posted");
            SchedulerMetrics::record_transition(MessageCommand::NAME);
            Ok(updated)
        })
        .await
    }

    /// One page of slots matching `criteria` for `caller`.
    ///
    /// Filtering happens after the store has read a page, so a page may hold
    /// fewer slots than the page size (even none) while `next` is still set.
    /// Keep going until `next` is `None`.
    ///
    /// # Errors
    ///
    /// - `Validation`: `token` was not produced by a previous listing
    /// - `Authorization`: unknown caller
    /// - `TransientStore`: infrastructure failure
    #[tracing::instrument(skip(self, criteria, token))]
    pub async fn list(
        &self,
        criteria: ListCriteria,
        caller: &str,
        token: Option<PageToken>,
    ) -> Result<Page, SchedulingError> {
        timed("list", async {
            let user = self.caller(caller).await?;
            let ends_after = criteria.ends_after.unwrap_or_else(|| self.clock.now());
            let criteria = ListCriteria {
                ends_after: Some(ends_after),
                ..criteria
            };

            let page = self
                .store
                .scan(ScanRequest {
                    ends_after: Some(ends_after),
                    start_after: token,
                    limit: self.config.page_size,
                })
                .await
                .map_err(|e| SchedulingError::from_store(e, "scan failed"))?;

            let examined = page.slots.len();
            let slots = page
                .slots
                .into_iter()
                .filter(|slot| criteria.matches(slot, &user))
                .collect::<Vec<_>>();
            tracing::debug!(examined, returned = slots.len(), "Listed slots");
            Ok(Page {
                slots,
                next: page.next,
            })
        })
        .await
    }

    /// Fetch slot `id`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown slot
    /// - `TransientStore`: infrastructure failure
    pub async fn get(&self, id: &str) -> Result<Slot, SchedulingError> {
        self.fetch(&SlotId::new(id)).await
    }

    /// Remove every slot past its expiration time.
    ///
    /// # Errors
    ///
    /// - `TransientStore`: infrastructure failure
    pub async fn purge_expired(&self) -> Result<u64, SchedulingError> {
        let now = self.clock.now();
        let removed = self
            .store
            .purge_expired(now)
            .await
            .map_err(|e| SchedulingError::from_store(e, "purge failed"))?;
        if removed > 0 {
            SchedulerMetrics::record_expired(removed);
            tracing::info!(removed, %now, "Purged expired slots");
        }
        Ok(removed)
    }

    /// Whether the store answers reads, and how quickly.
    pub async fn health_check(&self) -> HealthCheck {
        let started = Instant::now();
        let read = self.store.get(SlotId::new("health-check")).await;
        let latency = started.elapsed();

        let check = match read {
            Err(e) => HealthCheck::unhealthy("slot_store", e.to_string()),
            Ok(_) if latency > self.config.slow_store_threshold => {
                HealthCheck::degraded("slot_store", format!("read took {}ms", latency.as_millis()))
            }
            Ok(_) => HealthCheck::healthy("slot_store"),
        };
        check
            .with_metadata("latency_ms", latency.as_millis().to_string())
            .with_metadata("hooks", self.hooks.len().to_string())
    }

    /// Overall status, for readiness checks.
    pub async fn health(&self) -> HealthStatus {
        self.health_check().await.status
    }

    async fn caller(&self, username: &str) -> Result<User, SchedulingError> {
        self.users
            .get(username)
            .await
            .map_err(SchedulingError::from_identity)
    }

    async fn read(&self, id: &SlotId) -> Result<Option<Slot>, SchedulingError> {
        self.store
            .get(id.clone())
            .await
            .map_err(|e| SchedulingError::from_store(e, "read failed"))
    }

    async fn fetch(&self, id: &SlotId) -> Result<Slot, SchedulingError> {
        self.read(id)
            .await?
            .ok_or_else(|| SchedulingError::NotFound(id.clone()))
    }

    async fn after_commit(
        &self,
        kind: TransitionKind,
        slot: Slot,
        actor: User,
        notify: Option<String>,
    ) {
        SchedulerMetrics::record_transition(kind.as_str());
        let committed = Committed {
            kind,
            slot,
            actor,
            notify,
        };
        run_hooks(&self.hooks, &committed).await;
    }
}

async fn timed<T>(op: &'static str, operation: impl Future<Output = T>) -> T {
    let started = Instant::now();
    let output = operation.await;
    SchedulerMetrics::record_duration(op, started.elapsed());
    output
}

/// Builder for [`SchedulingEngine`].
///
/// Hooks run in this order: legacy mirror, statistics, notifications, then
/// any extra hooks in the order they were added.
///
/// # Example
///
/// ```
/// use dojo_scheduler_runtime::{EngineConfig, SchedulingEngine};
/// use dojo_scheduler_testing::{InMemorySlotStore, StaticUserDirectory, test_clock};
///
/// let engine = SchedulingEngine::builder()
///     .store(InMemorySlotStore::new())
///     .users(StaticUserDirectory::new())
///     .clock(test_clock())
///     .config(EngineConfig::default().with_page_size(20))
///     .build()?;
/// # Ok::<(), dojo_scheduler_runtime::EngineBuildError>(())
/// ```
#[derive(Default)]
pub struct SchedulingEngineBuilder {
    store: Option<Arc<dyn SlotStore>>,
    users: Option<Arc<dyn UserGetter>>,
    clock: Option<Arc<dyn Clock>>,
    mirror: Option<Arc<dyn LegacyMirror>>,
    statistics: Option<Arc<dyn StatisticsRecorder>>,
    notifications: Option<Arc<dyn NotificationGateway>>,
    extra_hooks: Vec<Arc<dyn PostCommitHook>>,
    config: EngineConfig,
}

impl SchedulingEngineBuilder {
    /// Set the slot store.
    #[must_use]
    pub fn store(self, store: impl SlotStore + 'static) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Set an already shared slot store.
    #[must_use]
    pub fn shared_store(mut self, store: Arc<dyn SlotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the identity lookup.
    #[must_use]
    pub fn users(mut self, users: impl UserGetter + 'static) -> Self {
        self.users = Some(Arc::new(users));
        self
    }

    /// Set the clock (defaults to the system clock).
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Mirror one-on-one bookings into the legacy availability/meeting pair.
    #[must_use]
    pub fn mirror(self, mirror: impl LegacyMirror + 'static) -> Self {
        self.shared_mirror(Arc::new(mirror))
    }

    /// Same as [`mirror`](Self::mirror) for an already shared mirror.
    #[must_use]
    pub fn shared_mirror(mut self, mirror: Arc<dyn LegacyMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Record statistics after each transition.
    #[must_use]
    pub fn statistics(mut self, recorder: impl StatisticsRecorder + 'static) -> Self {
        self.statistics = Some(Arc::new(recorder));
        self
    }

    /// Send notifications after bookings and cancellations.
    #[must_use]
    pub fn notifications(mut self, gateway: impl NotificationGateway + 'static) -> Self {
        self.notifications = Some(Arc::new(gateway));
        self
    }

    /// Append a custom post-commit hook.
    #[must_use]
    pub fn hook(mut self, hook: impl PostCommitHook + 'static) -> Self {
        self.extra_hooks.push(Arc::new(hook));
        self
    }

    /// Append an already shared post-commit hook.
    #[must_use]
    pub fn shared_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.extra_hooks.push(hook);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineBuildError`] if the store or the user getter is missing.
    pub fn build(self) -> Result<SchedulingEngine, EngineBuildError> {
        let store = self.store.ok_or(EngineBuildError::MissingStore)?;
        let users = self.users.ok_or(EngineBuildError::MissingUserGetter)?;

        let mut hooks: Vec<Arc<dyn PostCommitHook>> = Vec::new();
        if let Some(mirror) = self.mirror {
            hooks.push(Arc::new(LegacyMirrorHook::new(mirror)));
        }
        if let Some(recorder) = self.statistics {
            hooks.push(Arc::new(StatisticsHook::new(recorder)));
        }
        if let Some(gateway) = self.notifications {
            hooks.push(Arc::new(NotificationHook::new(gateway)));
        }
        hooks.extend(self.extra_hooks);

        Ok(SchedulingEngine {
            store,
            users,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            hooks: hooks.into(),
            config: self.config,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dojo_scheduler_testing::{InMemorySlotStore, StaticUserDirectory, test_clock};

    #[test]
    fn builder_requires_store_and_users() {
        let missing_store = SchedulingEngine::builder()
            .users(StaticUserDirectory::new())
            .build();
        let missing_users = SchedulingEngine::builder()
            .store(InMemorySlotStore::new())
            .build();

        assert_eq!(missing_store.unwrap_err(), EngineBuildError::MissingStore);
        assert_eq!(missing_users.unwrap_err(), EngineBuildError::MissingUserGetter);
    }

    #[test]
    fn hooks_are_installed_only_for_configured_collaborators() {
        let engine = SchedulingEngine::builder()
            .store(InMemorySlotStore::new())
            .users(StaticUserDirectory::new())
            .clock(test_clock())
            .build()
            .unwrap();

        assert!(engine.hooks.is_empty());
        assert_eq!(engine.config().page_size, 100);
    }
}
