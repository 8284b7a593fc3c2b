//! Application bootstrap: wires the store, the legacy mirror, the gateways
//! and the expiration sweeper around one [`SchedulingEngine`].

use crate::config::{Config, ConfigError, StoreBackend};
use crate::gateways::{LoggingNotifier, MetricsStatisticsRecorder};
use crate::sweeper::ExpirationSweeper;
use dojo_scheduler_core::error::StoreError;
use dojo_scheduler_core::gateway::UserGetter;
use dojo_scheduler_core::legacy::LegacyMirror;
use dojo_scheduler_core::store::SlotStore;
use dojo_scheduler_postgres::{PostgresLegacyMirror, PostgresSlotStore};
use dojo_scheduler_runtime::metrics::{MetricsError, MetricsServer};
use dojo_scheduler_runtime::{EngineBuildError, PostCommitHook, SchedulingEngine};
use dojo_scheduler_testing::{InMemoryLegacyMirror, InMemorySlotStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store setup (migrations) failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The engine was missing a dependency
    #[error("Engine error: {0}")]
    Engine(#[from] EngineBuildError),

    /// The Prometheus exporter could not be installed
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Waiting for the shutdown signal failed
    #[error("Signal error: {0}")]
    Signal(#[from] std::io::Error),
}

/// Store and mirror for the configured backend.
struct Backend {
    store: Arc<dyn SlotStore>,
    mirror: Arc<dyn LegacyMirror>,
}

/// The running scheduler: one engine plus its background tasks.
pub struct SchedulerApp {
    config: Config,
    engine: SchedulingEngine,
    shutdown_tx: broadcast::Sender<()>,
}

impl SchedulerApp {
    /// Build the application for `config`, resolving callers through `users`.
    ///
    /// With the postgres backend this connects the pool and runs the
    /// embedded migrations before the engine is built.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the database cannot be reached or migrated.
    pub async fn new(config: Config, users: impl UserGetter + 'static) -> Result<Self, AppError> {
        Self::with_hooks(config, users, Vec::new()).await
    }

    /// Like [`new`](Self::new), running `hooks` after the built-in ones.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub async fn with_hooks(
        config: Config,
        users: impl UserGetter + 'static,
        hooks: Vec<Arc<dyn PostCommitHook>>,
    ) -> Result<Self, AppError> {
        let backend = Self::backend(&config).await?;

        let mut builder = SchedulingEngine::builder()
            .shared_store(backend.store)
            .shared_mirror(backend.mirror)
            .users(users)
            .notifications(LoggingNotifier)
            .statistics(MetricsStatisticsRecorder)
            .config(config.engine_config());
        for hook in hooks {
            builder = builder.shared_hook(hook);
        }
        let engine = builder.build()?;

        let (shutdown_tx, _) = broadcast::channel(1);
        tracing::info!(store = %config.scheduler.store, "Scheduler initialized");
        Ok(Self {
            config,
            engine,
            shutdown_tx,
        })
    }

    async fn backend(config: &Config) -> Result<Backend, AppError> {
        match config.scheduler.store {
            StoreBackend::Memory => Ok(Backend {
                store: Arc::new(InMemorySlotStore::new()),
                mirror: Arc::new(InMemoryLegacyMirror::new()),
            }),
            StoreBackend::Postgres => {
                let pg = &config.postgres;
                tracing::info!("Connecting to slot database...");
                let pool = PgPoolOptions::new()
                    .max_connections(pg.max_connections)
                    .min_connections(pg.min_connections)
                    .acquire_timeout(Duration::from_secs(pg.connect_timeout))
                    .idle_timeout(Duration::from_secs(pg.idle_timeout))
                    .connect(&pg.url)
                    .await?;
                let store = PostgresSlotStore::new(pool.clone());
                store.migrate().await?;
                tracing::info!("Slot database connected and migrated");
                Ok(Backend {
                    store: Arc::new(store),
                    mirror: Arc::new(PostgresLegacyMirror::new(pool)),
                })
            }
        }
    }

    /// The engine all operations go through.
    #[must_use]
    pub const fn engine(&self) -> &SchedulingEngine {
        &self.engine
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Sweeper configured with the loaded sweep interval.
    #[must_use]
    pub fn sweeper(&self) -> ExpirationSweeper {
        ExpirationSweeper::new(self.engine.clone(), self.config.sweep_interval())
    }

    /// Install the Prometheus exporter when a metrics port is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the address is invalid or the exporter cannot
    /// be installed.
    pub fn start_metrics(&self) -> Result<Option<MetricsServer>, AppError> {
        let Some(addr) = self.config.metrics_addr()? else {
            tracing::info!("Metrics exporter disabled");
            return Ok(None);
        };
        let mut server = MetricsServer::new(addr);
        server.start()?;
        Ok(Some(server))
    }

    /// Start background tasks, returning their handles.
    #[must_use]
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![self.sweeper().spawn(self.shutdown_tx.subscribe())]
    }

    /// Signal every background task to stop and wait for them, giving each
    /// the configured shutdown timeout.
    pub async fn shutdown(&self, handles: Vec<JoinHandle<()>>) {
        let _ = self.shutdown_tx.send(());
        let timeout = Duration::from_secs(self.config.server.shutdown_timeout);
        for (idx, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => tracing::info!(task = idx, "Background task stopped gracefully"),
                Ok(Err(e)) => tracing::warn!(task = idx, error = %e, "Background task failed"),
                Err(_) => tracing::warn!(task = idx, "Background task shutdown timed out"),
            }
        }
    }

    /// Run until Ctrl+C or SIGTERM, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if metrics cannot be started or the signal
    /// handlers cannot be installed.
    pub async fn run(self) -> Result<(), AppError> {
        let _metrics = self.start_metrics()?;
        let handles = self.start();
        tracing::info!("Scheduler running, press Ctrl+C to shut down");

        shutdown_signal().await?;

        tracing::info!("Shutting down gracefully...");
        self.shutdown(handles).await;
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() -> Result<(), std::io::Error> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C signal");
        }
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
    Ok(())
}
