//! Engine configuration.

use dojo_scheduler_core::slot::Retention;
use std::time::Duration;

/// Tunables of the [`SchedulingEngine`](crate::SchedulingEngine).
///
/// # Example
///
/// ```
/// use dojo_scheduler_runtime::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_page_size(50)
///     .with_standard_retention(chrono::Duration::hours(72));
/// assert_eq!(config.page_size, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long slots are kept after they end.
    pub retention: Retention,
    /// Records examined per listing page.
    pub page_size: usize,
    /// Store reads slower than this report the store as degraded.
    pub slow_store_threshold: Duration,
}

impl EngineConfig {
    /// Create a configuration with custom values
    #[must_use]
    pub const fn new(retention: Retention, page_size: usize) -> Self {
        Self {
            retention,
            page_size,
            slow_store_threshold: Duration::from_secs(1),
        }
    }

    /// Set the retention of ordinary slots
    #[must_use]
    pub const fn with_standard_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention.standard = retention;
        self
    }

    /// Set the retention of long-lived slots (league tournaments)
    #[must_use]
    pub const fn with_long_lived_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention.long_lived = retention;
        self
    }

    /// Set the latency above which the store is reported degraded
    #[must_use]
    pub const fn with_slow_store_threshold(mut self, threshold: Duration) -> Self {
        self.slow_store_threshold = threshold;
        self
    }

    /// Set the listing page size; zero is raised to one
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = if page_size == 0 { 1 } else { page_size };
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(Retention::default(), 100)
    }
}
