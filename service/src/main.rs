//! Scheduler process.
//!
//! Builds the engine on the configured store, resolves callers from the
//! users file named by `SCHEDULER_USERS_FILE`, serves Prometheus metrics and
//! runs the expiration sweep until Ctrl+C or SIGTERM.

use dojo_scheduler_service::{Config, FileUserDirectory, SchedulerApp};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| "info,dojo_scheduler=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        store = %config.scheduler.store,
        sweep_interval_secs = config.scheduler.sweep_interval_secs,
        "Configuration loaded"
    );

    let users_file = config.users_file()?.to_string();
    let users = FileUserDirectory::load(&users_file).await?;
    tracing::info!(users = users.len(), path = %users_file, "User directory loaded");

    let app = SchedulerApp::new(config, users).await?;
    app.run().await?;
    Ok(())
}
