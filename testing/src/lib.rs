//! # Dojo Scheduler Testing
//!
//! Testing utilities for the Dojo scheduler.
//!
//! This crate provides:
//! - [`InMemorySlotStore`]: a `SlotStore` that arbitrates racing writers
//! - [`InMemoryLegacyMirror`]: the availability/meeting pair, with failure injection
//! - Mock collaborators that record what the engine asked of them
//! - [`FixedClock`] for deterministic time
//! - [`SlotBuilder`] and user helpers for test data
//!
//! ## Example
//!
//! ```ignore
//! use dojo_scheduler_testing::*;
//!
//! #[tokio::test]
//! async fn owner_cannot_book() {
//!     let store = InMemorySlotStore::new();
//!     store.insert(SlotBuilder::new("s1").owner(&member("alice", "1500-1600")).build());
//!     let engine = SchedulingEngine::builder().store(store.clone()).build()?;
//!
//!     let result = engine.book("s1", "alice", BookRequest::default()).await;
//!     assert!(matches!(result, Err(SchedulingError::Authorization(_))));
//!     assert_eq!(store.write_attempts(), 0);
//! }
//! ```

use chrono::{DateTime, Utc};
use dojo_scheduler_core::environment::Clock;

pub mod builders;
pub mod gateways;
pub mod mirror;
pub mod slot_store;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Clock for deterministic tests
    ///
    /// Returns the same time until a test moves it with [`advance`](Self::advance)
    /// or [`set`](Self::set). Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use dojo_scheduler_testing::mocks::FixedClock;
    /// use dojo_scheduler_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    ///
    /// clock.advance(Duration::hours(1));
    /// assert_eq!(clock.now() - time1, Duration::hours(1));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock to `time`.
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }

        /// Move the clock forward by `by`.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use builders::{SlotBuilder, admin, member};
pub use gateways::{
    RecordedStatistic, RecordingNotifier, RecordingStatistics, SentNotification,
    StaticUserDirectory,
};
pub use mirror::InMemoryLegacyMirror;
pub use mocks::{FixedClock, test_clock};
pub use slot_store::InMemorySlotStore;
