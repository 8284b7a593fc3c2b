//! Shared fixture for engine integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use dojo_scheduler_core::draft::SlotDraft;
use dojo_scheduler_core::slot::SlotKind;
use dojo_scheduler_runtime::{EngineConfig, SchedulingEngine};
use dojo_scheduler_testing::{
    FixedClock, InMemoryLegacyMirror, InMemorySlotStore, RecordingNotifier, RecordingStatistics,
    StaticUserDirectory, admin, member, test_clock,
};

pub const COHORT: &str = "1500-1600";

/// An engine wired to in-memory collaborators that tests can inspect.
pub struct Harness {
    pub engine: SchedulingEngine,
    pub store: InMemorySlotStore,
    pub mirror: InMemoryLegacyMirror,
    pub notifier: RecordingNotifier,
    pub stats: RecordingStatistics,
    pub users: StaticUserDirectory,
    pub clock: FixedClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            InMemoryLegacyMirror::new(),
            RecordingNotifier::new(),
            RecordingStatistics::new(),
            EngineConfig::default(),
        )
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(
            InMemoryLegacyMirror::new(),
            RecordingNotifier::new(),
            RecordingStatistics::new(),
            config,
        )
    }

    /// Every collaborator behind the store fails.
    pub fn with_failing_collaborators() -> Self {
        Self::build(
            InMemoryLegacyMirror::failing(),
            RecordingNotifier::failing(),
            RecordingStatistics::failing(),
            EngineConfig::default(),
        )
    }

    fn build(
        mirror: InMemoryLegacyMirror,
        notifier: RecordingNotifier,
        stats: RecordingStatistics,
        config: EngineConfig,
    ) -> Self {
        let store = InMemorySlotStore::new();
        let clock = test_clock();
        let users = StaticUserDirectory::with_users([
            member("owner", COHORT),
            member("alice", COHORT),
            member("bob", COHORT),
            member("carol", COHORT),
            member("dave", "2000-2100"),
            admin("sensei_admin"),
        ]);
        for n in 0..16 {
            users.add(member(&format!("racer{n}"), COHORT));
        }

        #[allow(clippy::unwrap_used)]
        let engine = SchedulingEngine::builder()
            .store(store.clone())
            .users(users.clone())
            .clock(clock.clone())
            .mirror(mirror.clone())
            .statistics(stats.clone())
            .notifications(notifier.clone())
            .config(config)
            .build()
            .unwrap();

        Self {
            engine,
            store,
            mirror,
            notifier,
            stats,
            users,
            clock,
        }
    }
}

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    #[allow(clippy::unwrap_used)]
    rfc3339.parse().unwrap()
}

/// Draft of a 1:1 availability owned by `owner`, 2025-01-01 10:00-11:00Z.
pub fn one_on_one_draft(owner: &str) -> SlotDraft {
    SlotDraft {
        kind: Some(SlotKind::Availability),
        owner: owner.to_string(),
        owner_display_name: owner.to_string(),
        start_time: "2025-01-01T10:00:00Z".to_string(),
        end_time: "2025-01-01T11:00:00Z".to_string(),
        cohorts: vec![COHORT.to_string()],
        types: vec!["CLASSICAL_GAME".to_string()],
        max_participants: Some(1),
        ..SlotDraft::default()
    }
}
