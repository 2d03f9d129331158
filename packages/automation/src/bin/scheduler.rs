//! Email Automation Scheduler
//!
//! This binary runs the background scheduler that sweeps due email
//! schedules every minute and dispatches them through the CRM.

use std::sync::Arc;

use anyhow::{Context, Result};
use automation_core::domains::email::ScheduleEngine;
use automation_core::kernel::scheduled_tasks::start_scheduler;
use automation_core::kernel::{
    CrmResolverAdapter, CrmSenderAdapter, Deps, DispatchSettings, RateLimiter,
};
use automation_core::store::PgStore;
use automation_core::Config;
use crm::{CrmOptions, CrmService};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,automation_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting email automation scheduler");

    let config = Config::from_env()?;

    // Database setup
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // Create CRM service and its trait adapters
    let crm = Arc::new(CrmService::new(CrmOptions {
        base_url: config.crm_base_url.clone(),
        api_key: config.crm_api_key.clone(),
    }));
    let resolver = Arc::new(CrmResolverAdapter(crm.clone()));
    let sender = Arc::new(CrmSenderAdapter(crm));

    let store = Arc::new(PgStore::new(pool));
    let settings = DispatchSettings::from_config(&config);

    let deps = Deps::new(
        store.clone(),
        store,
        resolver,
        sender,
        Arc::new(RateLimiter::new()),
        settings,
    );
    let engine = Arc::new(ScheduleEngine::from_deps(&deps));

    let scheduler = start_scheduler(engine).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, stopping scheduler");
    drop(scheduler);

    Ok(())
}
