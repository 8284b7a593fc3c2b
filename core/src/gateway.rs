//! Narrow interfaces to the collaborators the engine consumes but does not
//! implement: identity lookup, notification delivery and statistics.
//!
//! Notification and statistics calls happen only after a transition has been
//! committed to the store, and their failures never change the outcome of the
//! operation that triggered them.

use crate::cohort::{Cohort, SessionType};
use crate::error::GatewayError;
use crate::slot::{Participant, Slot};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by gateway calls.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Identity of a caller as resolved by the identity service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Unique username.
    pub username: String,
    /// Name shown to other users.
    pub display_name: String,
    /// Current cohort.
    pub cohort: Cohort,
    /// Cohort the user most recently graduated from.
    pub previous_cohort: Option<Cohort>,
    /// Administrative capability (required for broadcast kinds).
    pub is_admin: bool,
}

impl User {
    /// Snapshot stored in a slot's participant map.
    #[must_use]
    pub fn as_participant(&self) -> Participant {
        Participant {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            cohort: self.cohort.clone(),
            previous_cohort: self.previous_cohort.clone(),
        }
    }
}

/// Resolves usernames to users.
pub trait UserGetter: Send + Sync {
    /// Look up a user.
    ///
    /// # Errors
    ///
    /// - `UnknownUser`: no such user
    /// - `Unavailable`: the identity service could not be reached
    fn get(&self, username: &str) -> GatewayFuture<'_, User>;
}

/// What happened to a slot, from a recipient's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Someone booked a seat in the recipient's slot.
    SlotBooked,
    /// A booking the recipient is part of was canceled.
    SlotCanceled,
}

impl NotificationKind {
    /// Stable name used in logs and templates.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SlotBooked => "slot_booked",
            Self::SlotCanceled => "slot_canceled",
        }
    }
}

/// Delivers notifications (chat, email, ...).
pub trait NotificationGateway: Send + Sync {
    /// Notify `target_user` that `kind` happened to `slot`.
    ///
    /// # Errors
    ///
    /// Any delivery failure. The engine logs and drops it.
    fn notify<'a>(
        &'a self,
        kind: NotificationKind,
        target_user: &'a str,
        slot: &'a Slot,
    ) -> GatewayFuture<'a, ()>;
}

/// Which counter a statistic increments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatisticKind {
    /// A slot was created or updated.
    Created,
    /// A seat was booked.
    Booked,
    /// A booking was canceled.
    Canceled,
    /// A slot was deleted.
    Deleted,
}

impl StatisticKind {
    /// Stable name used as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Booked => "booked",
            Self::Canceled => "canceled",
            Self::Deleted => "deleted",
        }
    }
}

/// Aggregates usage statistics.
pub trait StatisticsRecorder: Send + Sync {
    /// Record one occurrence of `kind` for `cohort` and, when known, `slot_type`.
    ///
    /// # Errors
    ///
    /// Any recording failure. The engine logs and drops it.
    fn record<'a>(
        &'a self,
        kind: StatisticKind,
        cohort: &'a Cohort,
        slot_type: Option<SessionType>,
    ) -> GatewayFuture<'a, ()>;
}
