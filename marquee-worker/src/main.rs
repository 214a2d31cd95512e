use anyhow::Context;
use marquee_booking::BookingEngine;
use marquee_store::{app_config::Config, DbClient, PgBookingStore};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_worker=debug,marquee_booking=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        "Starting Marquee worker, hold {} min, sweep every {}s",
        config.booking.hold_minutes,
        config.sweeper.interval_seconds
    );

    // Database
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let store = Arc::new(PgBookingStore::new(db.pool.clone()));
    let engine = BookingEngine::new(store, config.booking.clone());

    // Event log
    tokio::spawn(sweeper::log_events(engine.subscribe()));

    // Sweeper
    let (stop_tx, stop_rx) = watch::channel(false);
    let every = Duration::from_secs(config.sweeper.interval_seconds.max(1));
    let sweeper = tokio::spawn(sweeper::run_sweeper(engine, every, stop_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    stop_tx.send(true).ok();
    sweeper.await.context("Sweeper task panicked")?;

    db.pool.close().await;
    Ok(())
}
