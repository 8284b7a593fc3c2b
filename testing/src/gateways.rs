//! Mock collaborators: identity lookup, notifications and statistics.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use dojo_scheduler_core::cohort::{Cohort, SessionType};
use dojo_scheduler_core::error::GatewayError;
use dojo_scheduler_core::gateway::{
    GatewayFuture, NotificationGateway, NotificationKind, StatisticKind, StatisticsRecorder, User,
    UserGetter,
};
use dojo_scheduler_core::slot::{Slot, SlotId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Fixed directory of users.
#[derive(Clone, Debug, Default)]
pub struct StaticUserDirectory {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl StaticUserDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with `users`.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.add(user);
        }
        directory
    }

    /// Add or replace a user.
    pub fn add(&self, user: User) {
        self.users
            .write()
            .unwrap()
            .insert(user.username.clone(), user);
    }
}

impl UserGetter for StaticUserDirectory {
    fn get(&self, username: &str) -> GatewayFuture<'_, User> {
        let found = self.users.read().unwrap().get(username).cloned();
        let username = username.to_string();
        Box::pin(async move { found.ok_or(GatewayError::UnknownUser(username)) })
    }
}

/// One captured notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentNotification {
    /// What happened.
    pub kind: NotificationKind,
    /// Who was told.
    pub target_user: String,
    /// About which slot.
    pub slot_id: SlotId,
}

/// Notification gateway that records every call.
///
/// A failing recorder still records the attempt before returning an error.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Create a notifier that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a notifier that always fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Notifications attempted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationGateway for RecordingNotifier {
    fn notify<'a>(
        &'a self,
        kind: NotificationKind,
        target_user: &'a str,
        slot: &'a Slot,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(SentNotification {
                kind,
                target_user: target_user.to_string(),
                slot_id: slot.id.clone(),
            });
            if self.fail {
                Err(GatewayError::Unavailable("notification service down".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

/// One captured statistic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedStatistic {
    /// Which counter.
    pub kind: StatisticKind,
    /// Cohort it was keyed by.
    pub cohort: Cohort,
    /// Slot type, when known.
    pub slot_type: Option<SessionType>,
}

/// Statistics recorder that keeps every call.
#[derive(Clone, Debug, Default)]
pub struct RecordingStatistics {
    recorded: Arc<Mutex<Vec<RecordedStatistic>>>,
    fail: bool,
}

impl RecordingStatistics {
    /// Create a recorder that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder that always fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Statistics attempted so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedStatistic> {
        self.recorded.lock().unwrap().clone()
    }
}

impl StatisticsRecorder for RecordingStatistics {
    fn record<'a>(
        &'a self,
        kind: StatisticKind,
        cohort: &'a Cohort,
        slot_type: Option<SessionType>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            self.recorded.lock().unwrap().push(RecordedStatistic {
                kind,
                cohort: cohort.clone(),
                slot_type,
            });
            if self.fail {
                Err(GatewayError::Rejected("statistics table throttled".to_string()))
            } else {
                Ok(())
            }
        })
    }
}
