//! Scheduled background tasks.
//!
//! One cron job drives the whole email pipeline:
//!
//! ```text
//! Scheduler (every minute)
//!     │
//!     └─► due_schedules(now)
//!             └─► For each due schedule → ScheduleEngine::fire
//!                     └─► claim window → Dispatcher → SendLog rows
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::email::engine::ScheduleEngine;

/// Start all scheduled tasks
pub async fn start_scheduler(engine: Arc<ScheduleEngine>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Due-schedule sweep - runs every minute
    let fire_engine = engine.clone();
    let fire_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let engine = fire_engine.clone();
        Box::pin(async move {
            if let Err(e) = run_due_schedules(&engine).await {
                tracing::error!("Due-schedule sweep failed: {}", e);
            }
        })
    })?;

    scheduler.add(fire_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (due-schedule sweep every minute)");
    Ok(scheduler)
}

/// Fire every schedule whose window has arrived.
///
/// Failures are per-schedule: one broken schedule is logged and the sweep
/// moves on to the next. Concurrent sweeps from other processes are safe;
/// the engine's window claim lets only one of them dispatch.
async fn run_due_schedules(engine: &ScheduleEngine) -> Result<()> {
    let now = Utc::now();
    let due = engine.due_schedules(now).await?;

    if due.is_empty() {
        return Ok(());
    }
    tracing::info!("Found {} schedule(s) due for dispatch", due.len());

    for schedule in due {
        match engine.fire(schedule.id, now).await {
            Ok(result) => {
                tracing::info!(
                    schedule_id = %schedule.id,
                    sent = result.sent,
                    failed = result.failed,
                    skipped = result.skipped,
                    "Schedule dispatched"
                );
            }
            Err(e) => {
                tracing::error!(schedule_id = %schedule.id, "Schedule fire failed: {}", e);
            }
        }
    }

    Ok(())
}
