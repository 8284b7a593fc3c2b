//! # Dojo Scheduler Runtime
//!
//! The scheduling engine and what runs around it.
//!
//! ## Core Components
//!
//! - **[`SchedulingEngine`]**: validates requests, arbitrates concurrent
//!   bookings through the store's conditional writes, and runs post-commit
//!   hooks
//! - **[`hooks`]**: best-effort side effects (legacy mirror, statistics,
//!   notifications) that can never undo a committed transition
//! - **[`metrics`]**: Prometheus metrics
//! - **[`retry`]**: caller-side retry for callers that want to keep trying
//!   after losing a race
//!
//! ## Example
//!
//! ```
//! use dojo_scheduler_core::command::BookRequest;
//! use dojo_scheduler_core::error::SchedulingError;
//! use dojo_scheduler_runtime::SchedulingEngine;
//! use dojo_scheduler_testing::{InMemorySlotStore, SlotBuilder, StaticUserDirectory, member, test_clock};
//!
//! # tokio_test::block_on(async {
//! let alice = member("alice", "1500-1600");
//! let bob = member("bob", "1500-1600");
//!
//! let store = InMemorySlotStore::new();
//! store.insert(SlotBuilder::new("s1").owner(&alice).build());
//!
//! let engine = SchedulingEngine::builder()
//!     .store(store.clone())
//!     .users(StaticUserDirectory::with_users([alice, bob]))
//!     .clock(test_clock())
//!     .build()
//!     .unwrap();
//!
//! let booked = engine.book("s1", "bob", BookRequest::default()).await.unwrap();
//! assert_eq!(booked.participant_count(), 1);
//!
//! let again = engine.book("s1", "bob", BookRequest::default()).await;
//! assert!(matches!(again, Err(SchedulingError::Conflict { .. })));
//! # });
//! ```

pub mod config;
pub mod engine;
pub mod health;
pub mod hooks;
pub mod metrics;
pub mod retry;

pub use config::EngineConfig;
pub use engine::{EngineBuildError, SchedulingEngine, SchedulingEngineBuilder};
pub use health::{HealthCheck, HealthStatus};
pub use hooks::{Committed, HookError, PostCommitHook, TransitionKind};
