//! # Dojo Scheduler Core
//!
//! Domain types and rules for the Dojo scheduling and booking engine.
//!
//! This crate holds everything that can be decided without I/O: the slot
//! record and its state machine, the eligibility filter, payload validation,
//! and the typed commands that pair each transition with the precondition the
//! store must evaluate. The traits for the store and the external
//! collaborators live here too, so the runtime and the storage backends only
//! depend on this crate.
//!
//! ## Core Concepts
//!
//! - **Slot**: one schedulable record (1:1, group or broadcast session)
//! - **Precondition**: predicate the store evaluates atomically at write time
//! - **Command**: a prepared transition carrying its precondition and patch
//! - **Eligibility**: who may book or see a slot
//! - **Legacy mirror**: the availability/meeting pair derived from a slot
//!
//! ## Example
//!
//! ```
//! use dojo_scheduler_core::command::{BookCommand, BookRequest, Transition};
//! use dojo_scheduler_core::draft::SlotDraft;
//! use dojo_scheduler_core::gateway::User;
//! use dojo_scheduler_core::cohort::Cohort;
//! use dojo_scheduler_core::slot::{Retention, SlotKind};
//!
//! let owner = User {
//!     username: "alice".into(),
//!     display_name: "Alice".into(),
//!     cohort: Cohort::from("1500-1600"),
//!     previous_cohort: None,
//!     is_admin: false,
//! };
//! let slot = SlotDraft {
//!     kind: Some(SlotKind::Availability),
//!     owner: "alice".into(),
//!     owner_display_name: "Alice".into(),
//!     start_time: "2025-01-01T10:00:00Z".into(),
//!     end_time: "2025-01-01T11:00:00Z".into(),
//!     types: vec!["CLASSICAL_GAME".into()],
//!     cohorts: vec!["1500-1600".into()],
//!     ..SlotDraft::default()
//! }
//! .into_slot(&owner, &Retention::default())?;
//!
//! let bob = User { username: "bob".into(), display_name: "Bob".into(), ..owner };
//! let command = BookCommand::prepare(&slot, &bob, BookRequest::default())?;
//! assert!(command.precondition().evaluate(Some(&slot)));
//! # Ok::<(), dojo_scheduler_core::error::SchedulingError>(())
//! ```

pub mod cohort;
pub mod command;
pub mod draft;
pub mod eligibility;
pub mod error;
pub mod gateway;
pub mod legacy;
pub mod slot;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use cohort::{Cohort, SessionType};
pub use error::{GatewayError, SchedulingError, StoreError};
pub use slot::{Slot, SlotId, SlotKind, SlotStatus};

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// The engine reads the time for listing defaults and the expiration
    /// sweep reads it to decide what to purge.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
