//! `PostgreSQL` storage for the Dojo scheduler.
//!
//! This crate provides:
//!
//! - [`PostgresSlotStore`]: the `SlotStore` whose conditional writes are
//!   single SQL statements guarded by the rendered precondition
//! - [`PostgresLegacyMirror`]: the legacy availability/meeting tables
//! - Migrations for both, run with [`PostgresSlotStore::migrate`]
//!
//! # Example
//!
//! ```no_run
//! use dojo_scheduler_postgres::{PostgresLegacyMirror, PostgresSlotStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresSlotStore::connect("postgres://localhost/dojo", 10).await?;
//!     store.migrate().await?;
//!     let _mirror = PostgresLegacyMirror::new(store.pool().clone());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod mirror;
mod slot_store;
mod sql;

pub use mirror::PostgresLegacyMirror;
pub use slot_store::PostgresSlotStore;
