//! # Dojo Scheduler Service
//!
//! Process-level wiring for the scheduler:
//!
//! - [`Config`]: environment-driven configuration (`.env` supported)
//! - [`FileUserDirectory`]: callers resolved from a JSON users file
//! - [`SchedulerApp`]: builds the engine on the configured store and mirror,
//!   with the logging notifier and the metrics statistics recorder attached
//! - [`ExpirationSweeper`]: removes expired slots on an interval
//!
//! # Usage
//!
//! ```bash
//! # In-memory store, metrics on :9090
//! SCHEDULER_USERS_FILE=service/users.example.json cargo run --bin dojo-scheduler
//!
//! # PostgreSQL store
//! SCHEDULER_STORE=postgres DATABASE_URL=postgres://localhost/dojo \
//!     SCHEDULER_USERS_FILE=/etc/dojo/users.json cargo run --bin dojo-scheduler
//!
//! # Replay the booking walkthrough
//! cargo run --bin demo
//! ```

pub mod app;
pub mod config;
pub mod directory;
pub mod gateways;
pub mod sweeper;

pub use app::{AppError, SchedulerApp};
pub use config::{Config, ConfigError, StoreBackend};
pub use directory::{DirectoryError, FileUserDirectory};
pub use gateways::{LoggingNotifier, MetricsStatisticsRecorder};
pub use sweeper::ExpirationSweeper;
