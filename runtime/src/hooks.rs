//! Post-commit hooks.
//!
//! After the store accepts a transition the engine hands a [`Committed`]
//! record to each hook in order. Hooks are best-effort: [`run_hooks`] logs
//! and counts every error (and every panic) and carries on, so nothing a hook
//! does can change the result of the operation that triggered it.

use crate::metrics::SchedulerMetrics;
use dojo_scheduler_core::error::{GatewayError, StoreError};
use dojo_scheduler_core::gateway::{
    NotificationGateway, NotificationKind, StatisticKind, StatisticsRecorder, User,
};
use dojo_scheduler_core::legacy::LegacyMirror;
use dojo_scheduler_core::slot::Slot;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors a hook may report. They are logged, never returned to callers.
#[derive(Error, Debug)]
pub enum HookError {
    /// A collaborator call failed.
    #[error("Gateway call failed: {0}")]
    Gateway(#[from] GatewayError),

    /// A secondary record write failed.
    #[error("Mirror write failed: {0}")]
    Mirror(#[from] StoreError),
}

/// Boxed future returned by hooks.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send + 'a>>;

/// Which transition was committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    /// Slot created or updated.
    Saved,
    /// Seat booked.
    Booked,
    /// Booking canceled.
    Canceled,
    /// Slot deleted.
    Deleted,
}

impl TransitionKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "save",
            Self::Booked => "book",
            Self::Canceled => "cancel",
            Self::Deleted => "delete",
        }
    }

    /// Statistic counter this transition feeds.
    #[must_use]
    pub const fn statistic(&self) -> StatisticKind {
        match self {
            Self::Saved => StatisticKind::Created,
            Self::Booked => StatisticKind::Booked,
            Self::Canceled => StatisticKind::Canceled,
            Self::Deleted => StatisticKind::Deleted,
        }
    }

    /// Notification sent for this transition, if any.
    #[must_use]
    pub const fn notification(&self) -> Option<NotificationKind> {
        match self {
            Self::Booked => Some(NotificationKind::SlotBooked),
            Self::Canceled => Some(NotificationKind::SlotCanceled),
            Self::Saved | Self::Deleted => None,
        }
    }
}

/// A transition the store has accepted.
#[derive(Clone, Debug)]
pub struct Committed {
    /// What happened.
    pub kind: TransitionKind,
    /// The slot as written (or as it was before deletion).
    pub slot: Slot,
    /// Who did it.
    pub actor: User,
    /// Who should be told, if anyone.
    pub notify: Option<String>,
}

/// Side effect run after a committed transition.
pub trait PostCommitHook: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// React to `committed`.
    ///
    /// # Errors
    ///
    /// Any failure; the runner logs it and moves on.
    fn after_commit<'a>(&'a self, committed: &'a Committed) -> HookFuture<'a>;
}

/// Run every hook in order, swallowing failures and panics.
pub async fn run_hooks(hooks: &[Arc<dyn PostCommitHook>], committed: &Committed) {
    for hook in hooks {
        let outcome = AssertUnwindSafe(hook.after_commit(committed))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                SchedulerMetrics::record_hook_failure(hook.name());
                tracing::warn!(
                    hook = hook.name(),
                    slot_id = %committed.slot.id,
                    transition = committed.kind.as_str(),
                    error = %error,
                    "Post-commit hook failed; transition stands"
                );
            }
            Err(_) => {
                SchedulerMetrics::record_hook_failure(hook.name());
                tracing::warn!(
                    hook = hook.name(),
                    slot_id = %committed.slot.id,
                    transition = committed.kind.as_str(),
                    "Post-commit hook panicked; transition stands"
                );
            }
        }
    }
}

/// Feeds the statistics recorder, keyed by the actor's cohort and the slot type.
pub struct StatisticsHook {
    recorder: Arc<dyn StatisticsRecorder>,
}

impl StatisticsHook {
    /// Wrap a recorder.
    #[must_use]
    pub fn new(recorder: Arc<dyn StatisticsRecorder>) -> Self {
        Self { recorder }
    }
}

impl PostCommitHook for StatisticsHook {
    fn name(&self) -> &'static str {
        "statistics"
    }

    fn after_commit<'a>(&'a self, committed: &'a Committed) -> HookFuture<'a> {
        Box::pin(async move {
            self.recorder
                .record(
                    committed.kind.statistic(),
                    &committed.actor.cohort,
                    committed.slot.primary_type(),
                )
                .await?;
            Ok(())
        })
    }
}

/// Notifies the affected user of bookings and cancellations.
pub struct NotificationHook {
    gateway: Arc<dyn NotificationGateway>,
}

impl NotificationHook {
    /// Wrap a gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { gateway }
    }
}

impl PostCommitHook for NotificationHook {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn after_commit<'a>(&'a self, committed: &'a Committed) -> HookFuture<'a> {
        Box::pin(async move {
            let (Some(kind), Some(target)) = (committed.kind.notification(), &committed.notify)
            else {
                return Ok(());
            };
            self.gateway.notify(kind, target, &committed.slot).await?;
            Ok(())
        })
    }
}

/// Keeps the legacy availability/meeting pair in step with one-on-one slots.
pub struct LegacyMirrorHook {
    mirror: Arc<dyn LegacyMirror>,
}

impl LegacyMirrorHook {
    /// Wrap a mirror.
    #[must_use]
    pub fn new(mirror: Arc<dyn LegacyMirror>) -> Self {
        Self { mirror }
    }
}

impl PostCommitHook for LegacyMirrorHook {
    fn name(&self) -> &'static str {
        "legacy_mirror"
    }

    fn after_commit<'a>(&'a self, committed: &'a Committed) -> HookFuture<'a> {
        Box::pin(async move {
            if !committed.slot.is_one_on_one() {
                return Ok(());
            }
            let result = match committed.kind {
                TransitionKind::Booked => self.mirror.mirror_booking(&committed.slot).await,
                TransitionKind::Canceled => self.mirror.restore_availability(&committed.slot).await,
                TransitionKind::Saved | TransitionKind::Deleted => Ok(()),
            };
            if result.is_err() {
                SchedulerMetrics::record_mirror_failure();
            }
            result.map_err(HookError::from)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use dojo_scheduler_testing::{
        InMemoryLegacyMirror, RecordingNotifier, RecordingStatistics, SlotBuilder, member,
    };

    struct PanickingHook;

    impl PostCommitHook for PanickingHook {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn after_commit<'a>(&'a self, _committed: &'a Committed) -> HookFuture<'a> {
            Box::pin(async move {
                let blow_up = true;
                if blow_up {
                    panic!("hook blew up");
                }
                Ok(())
            })
        }
    }

    fn booked() -> Committed {
        let bob = member("bob", "1500-1600");
        Committed {
            kind: TransitionKind::Booked,
            slot: SlotBuilder::new("s1").participant(&bob).build(),
            actor: bob,
            notify: Some("owner".into()),
        }
    }

    #[tokio::test]
    async fn failing_and_panicking_hooks_do_not_stop_later_hooks() {
        let notifier = RecordingNotifier::new();
        let hooks: Vec<Arc<dyn PostCommitHook>> = vec![
            Arc::new(PanickingHook),
            Arc::new(StatisticsHook::new(Arc::new(RecordingStatistics::failing()))),
            Arc::new(NotificationHook::new(Arc::new(notifier.clone()))),
        ];

        run_hooks(&hooks, &booked()).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target_user, "owner");
        assert_eq!(sent[0].kind, NotificationKind::SlotBooked);
    }

    #[tokio::test]
    async fn statistics_are_keyed_by_actor_cohort_and_slot_type() {
        let stats = RecordingStatistics::new();
        let hook = StatisticsHook::new(Arc::new(stats.clone()));
        hook.after_commit(&booked()).await.unwrap();

        let recorded = stats.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].kind, StatisticKind::Booked);
        assert_eq!(recorded[0].cohort.as_str(), "1500-1600");
        assert!(recorded[0].slot_type.is_some());
    }

    #[tokio::test]
    async fn saves_send_no_notification() {
        let notifier = RecordingNotifier::new();
        let hook = NotificationHook::new(Arc::new(notifier.clone()));
        let mut committed = booked();
        committed.kind = TransitionKind::Saved;
        hook.after_commit(&committed).await.unwrap();
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn mirror_hook_reports_failures() {
        let hook = LegacyMirrorHook::new(Arc::new(InMemoryLegacyMirror::failing()));
        assert!(matches!(
            hook.after_commit(&booked()).await,
            Err(HookError::Mirror(_))
        ));
    }
}
