//! Periodic removal of expired slots.

use dojo_scheduler_runtime::SchedulingEngine;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs [`SchedulingEngine::purge_expired`] on a fixed interval until told
/// to stop.
///
/// A failed sweep is logged and retried on the next tick.
#[derive(Clone)]
pub struct ExpirationSweeper {
    engine: SchedulingEngine,
    interval: Duration,
}

impl ExpirationSweeper {
    /// Create a sweeper; a zero interval is raised to one second.
    #[must_use]
    pub fn new(engine: SchedulingEngine, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Interval between sweeps.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep, returning how many slots were removed.
    pub async fn sweep_once(&self) -> u64 {
        match self.engine.purge_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "Expiration sweep failed");
                0
            }
        }
    }

    /// Sweep on every tick until `shutdown` fires. The first sweep runs
    /// immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs(), "Expiration sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_once().await;
                    if removed > 0 {
                        tracing::debug!(removed, "Sweep removed expired slots");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Expiration sweeper stopped");
    }

    /// Spawn [`run`](Self::run) onto the current runtime.
    #[must_use]
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dojo_scheduler_core::error::StoreError;
    use dojo_scheduler_core::slot::SlotKind;
    use dojo_scheduler_testing::{
        FixedClock, InMemorySlotStore, SlotBuilder, StaticUserDirectory, test_clock,
    };

    fn sweeper(store: &InMemorySlotStore, clock: FixedClock) -> ExpirationSweeper {
        let engine = SchedulingEngine::builder()
            .store(store.clone())
            .users(StaticUserDirectory::new())
            .clock(clock)
            .build()
            .unwrap();
        ExpirationSweeper::new(engine, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn sweep_once_removes_expired_slots() {
        let store = InMemorySlotStore::new();
        let clock = test_clock();
        store.insert(SlotBuilder::new("short").build());
        store.insert(SlotBuilder::new("league").kind(SlotKind::LigaTournament).build());
        let sweeper = sweeper(&store, clock.clone());

        assert_eq!(sweeper.sweep_once().await, 0);
        clock.advance(chrono::Duration::days(3));
        assert_eq!(sweeper.sweep_once().await, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_sweeps_report_nothing_removed() {
        let store = InMemorySlotStore::new();
        store.fail_with(StoreError::Database("down".into()));
        let sweeper = sweeper(&store, test_clock());

        assert_eq!(sweeper.sweep_once().await, 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = InMemorySlotStore::new();
        let clock = test_clock();
        store.insert(SlotBuilder::new("old").build());
        clock.advance(chrono::Duration::days(3));

        let (tx, rx) = broadcast::channel(1);
        let handle = sweeper(&store, clock).spawn(rx);
        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn zero_interval_is_raised() {
        let store = InMemorySlotStore::new();
        let engine = SchedulingEngine::builder()
            .store(store)
            .users(StaticUserDirectory::new())
            .build()
            .unwrap();
        assert_eq!(
            ExpirationSweeper::new(engine, Duration::ZERO).interval(),
            Duration::from_secs(1)
        );
    }
}
