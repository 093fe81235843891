//! phone_signup - phone-number signup backend
//!
//! Wires the OTP signup message bus against Postgres and runs the
//! maintenance scheduler until shutdown. The request layer embeds the bus
//! through the library crate.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phone_signup::jobs::{JobScheduler, JobSchedulerConfig};
use phone_signup::services::{BroadcastPublisher, LocalSmsService, NotificationKind};
use phone_signup::uow::PgUnitOfWorkFactory;
use phone_signup::{bootstrap, db, Config, Dependencies};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phone_signup=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Log every published notification
fn spawn_notification_logger(publisher: &BroadcastPublisher) -> tokio::task::JoinHandle<()> {
    let publisher = publisher.clone();
    tokio::spawn(async move {
        let mut rx = publisher.subscribe(NotificationKind::Notification).await;
        loop {
            match rx.recv().await {
                Ok(payload) => tracing::debug!(payload = %payload, "Notification published"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Notification logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let sms = LocalSmsService::for_environment(&config)?;

    tracing::info!(environment = %config.environment, "Starting phone_signup");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let publisher = BroadcastPublisher::new();
    let notification_logger = spawn_notification_logger(&publisher);

    // Wiring is validated here; a missing capability stops startup
    let deps = Dependencies::from_config(
        &config,
        Arc::new(PgUnitOfWorkFactory::new(pool.clone())),
        Arc::new(sms),
    )?
    .with_publisher(Arc::new(publisher));
    let bus = bootstrap(deps)?;

    tracing::info!(bus = ?bus, "Signup core ready");

    let scheduler =
        JobScheduler::with_config(pool.clone(), JobSchedulerConfig::from(&config)).start();

    shutdown_signal().await;

    // Cleanup
    tracing::info!("Shutting down...");
    scheduler.abort();
    notification_logger.abort();
    drop(bus);
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
