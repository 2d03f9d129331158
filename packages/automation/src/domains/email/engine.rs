//! Schedule lifecycle and fire orchestration.
//!
//! `fire` is safe to call from any number of scheduler processes: the
//! rate limiter soaks up tick storms, and the fire-window claim is a
//! compare-and-set on `next_run_at`, so exactly one caller dispatches a
//! given window no matter how many race for it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::PipelineError;
use crate::kernel::deps::{Deps, DispatchSettings};
use crate::kernel::rate_limit::{schedule_key, RateLimiter};
use crate::kernel::traits::BaseContactResolver;
use crate::store::EmailStore;

use super::dispatcher::Dispatcher;
use super::models::{
    Audience, Cadence, EmailSchedule, EmailTemplate, ScheduleStatus, SendLog, SendStatus,
    MAX_EVERY_SECONDS,
};

/// Outcome of one fire. `attempted` counts actual send attempts, so it is
/// always `sent + failed`; recipients short-circuited before the provider
/// call show up in `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct FireResult {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl FireResult {
    fn from_logs(logs: &[SendLog]) -> Self {
        let sent = logs.iter().filter(|l| l.status == SendStatus::Sent).count();
        let failed = logs
            .iter()
            .filter(|l| l.status == SendStatus::Failed)
            .count();
        let skipped = logs
            .iter()
            .filter(|l| l.status == SendStatus::Skipped)
            .count();
        Self {
            attempted: sent + failed,
            sent,
            failed,
            skipped,
        }
    }
}

pub struct ScheduleEngine {
    store: Arc<dyn EmailStore>,
    resolver: Arc<dyn BaseContactResolver>,
    rate_limiter: Arc<RateLimiter>,
    dispatcher: Dispatcher,
    settings: DispatchSettings,
}

impl ScheduleEngine {
    pub fn new(
        store: Arc<dyn EmailStore>,
        resolver: Arc<dyn BaseContactResolver>,
        rate_limiter: Arc<RateLimiter>,
        dispatcher: Dispatcher,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            rate_limiter,
            dispatcher,
            settings,
        }
    }

    /// Wire an engine (and its dispatcher) from the shared container.
    pub fn from_deps(deps: &Deps) -> Self {
        let dispatcher = Dispatcher::new(
            deps.email.clone(),
            deps.resolver.clone(),
            deps.sender.clone(),
            deps.settings,
        );
        Self::new(
            deps.email.clone(),
            deps.resolver.clone(),
            deps.rate_limiter.clone(),
            dispatcher,
            deps.settings,
        )
    }

    // -- lifecycle ------------------------------------------------------

    /// Create an active schedule. The template must belong to the given
    /// category; the first run is computed from the cadence at `now`.
    pub async fn create_schedule(
        &self,
        category_id: Uuid,
        template_id: Uuid,
        audience: Audience,
        cadence: Cadence,
        now: DateTime<Utc>,
    ) -> Result<EmailSchedule, PipelineError> {
        if self.store.get_category(category_id).await?.is_none() {
            return Err(PipelineError::Validation(format!(
                "unknown category {category_id}"
            )));
        }
        let template = self
            .store
            .get_template(template_id)
            .await?
            .ok_or_else(|| PipelineError::Validation(format!("unknown template {template_id}")))?;
        if template.category_id != category_id {
            return Err(PipelineError::Validation(format!(
                "template {template_id} does not belong to category {category_id}"
            )));
        }
        if let Cadence::Every { seconds } = cadence {
            if !(1..=MAX_EVERY_SECONDS).contains(&seconds) {
                return Err(PipelineError::Validation(format!(
                    "recurring cadence must be between 1 and {MAX_EVERY_SECONDS} seconds"
                )));
            }
        }
        if let Audience::Emails(emails) = &audience {
            if emails.is_empty() {
                return Err(PipelineError::Validation(
                    "recipient list must not be empty".to_string(),
                ));
            }
        }

        let schedule = EmailSchedule::builder()
            .category_id(category_id)
            .template_id(template_id)
            .audience(audience)
            .cadence(cadence)
            .next_run_at(cadence.first_run(now))
            .build();

        let schedule = self.store.insert_schedule(schedule).await?;
        info!(schedule_id = %schedule.id, next_run_at = %cadence.first_run(now), "email schedule created");
        Ok(schedule)
    }

    /// Active → paused. The schedule keeps its `next_run_at` but is never
    /// picked up while paused.
    pub async fn pause(&self, id: Uuid) -> Result<EmailSchedule, PipelineError> {
        let schedule = self.require(id).await?;
        if schedule.status != ScheduleStatus::Active {
            return Err(PipelineError::Validation(format!(
                "schedule {id} is not active, cannot pause"
            )));
        }
        let schedule = self
            .store
            .set_schedule_status(id, ScheduleStatus::Paused)
            .await?;
        info!(schedule_id = %id, "email schedule paused");
        Ok(schedule)
    }

    /// Paused → active.
    pub async fn resume(&self, id: Uuid) -> Result<EmailSchedule, PipelineError> {
        let schedule = self.require(id).await?;
        if schedule.status != ScheduleStatus::Paused {
            return Err(PipelineError::Validation(format!(
                "schedule {id} is not paused, cannot resume"
            )));
        }
        let schedule = self
            .store
            .set_schedule_status(id, ScheduleStatus::Active)
            .await?;
        info!(schedule_id = %id, "email schedule resumed");
        Ok(schedule)
    }

    /// Retire the schedule permanently. Disabled is terminal.
    pub async fn disable(&self, id: Uuid) -> Result<EmailSchedule, PipelineError> {
        let schedule = self.require(id).await?;
        if schedule.status == ScheduleStatus::Disabled {
            return Err(PipelineError::Validation(format!(
                "schedule {id} is already disabled"
            )));
        }
        let schedule = self
            .store
            .set_schedule_status(id, ScheduleStatus::Disabled)
            .await?;
        info!(schedule_id = %id, "email schedule disabled");
        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: Uuid) -> Result<Option<EmailSchedule>, PipelineError> {
        Ok(self.store.get_schedule(id).await?)
    }

    pub async fn list_schedules(&self) -> Result<Vec<EmailSchedule>, PipelineError> {
        Ok(self.store.list_schedules().await?)
    }

    /// Active schedules due at or before `now`, soonest first.
    pub async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<EmailSchedule>, PipelineError> {
        Ok(self.store.due_schedules(now).await?)
    }

    // -- firing ---------------------------------------------------------

    /// Fire one due schedule. Not-due and non-active schedules are
    /// rejected; a throttled fire defers `next_run_at` by the backoff and
    /// reports zero work; a lost window claim reports zero work.
    pub async fn fire(&self, id: Uuid, now: DateTime<Utc>) -> Result<FireResult, PipelineError> {
        let schedule = self.require(id).await?;
        if schedule.status != ScheduleStatus::Active {
            return Err(PipelineError::Validation(format!(
                "schedule {id} is not active"
            )));
        }
        let due = match schedule.next_run_at {
            Some(due) if due <= now => due,
            _ => {
                return Err(PipelineError::Validation(format!(
                    "schedule {id} is not due"
                )))
            }
        };

        if !self.rate_limiter.check_and_increment_at(
            &schedule_key(id),
            self.settings.schedule_rate_limit_window_ms,
            self.settings.schedule_rate_limit_max,
            now,
        ) {
            let deferred = now + Duration::seconds(self.settings.rate_limit_backoff_secs);
            // Deferral goes through the same claim so a concurrent winner
            // is never overwritten.
            self.store
                .claim_schedule_fire(id, due, Some(deferred), None, ScheduleStatus::Active)
                .await?;
            warn!(schedule_id = %id, %deferred, "schedule throttled, fire deferred");
            return Ok(FireResult::default());
        }

        let next = schedule.cadence.next_after(now);
        let status_after = if schedule.cadence.is_recurring() {
            ScheduleStatus::Active
        } else {
            ScheduleStatus::Disabled
        };
        if !self
            .store
            .claim_schedule_fire(id, due, next, Some(now), status_after)
            .await?
        {
            debug!(schedule_id = %id, "fire window already claimed");
            return Ok(FireResult::default());
        }

        let result = self.dispatch_for(&schedule, due).await?;
        info!(
            schedule_id = %id,
            attempted = result.attempted,
            sent = result.sent,
            failed = result.failed,
            skipped = result.skipped,
            "schedule fired"
        );
        Ok(result)
    }

    /// Fire a schedule outside its cadence. Allowed while active or
    /// paused; does not consume or move the schedule's fire window, and a
    /// throttled manual trigger is an error rather than a deferral.
    pub async fn trigger_manual(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<FireResult, PipelineError> {
        let schedule = self.require(id).await?;
        if schedule.status == ScheduleStatus::Disabled {
            return Err(PipelineError::Validation(format!(
                "schedule {id} is disabled"
            )));
        }

        if !self.rate_limiter.check_and_increment_at(
            &schedule_key(id),
            self.settings.schedule_rate_limit_window_ms,
            self.settings.schedule_rate_limit_max,
            now,
        ) {
            return Err(PipelineError::RateLimited(format!(
                "schedule {id} exceeded its send budget"
            )));
        }

        // The pending window keys idempotency so a manual nudge of an
        // overdue schedule cannot double-send that window later.
        let fire_window = schedule.next_run_at.unwrap_or(now);
        let result = self.dispatch_for(&schedule, fire_window).await?;
        info!(
            schedule_id = %id,
            attempted = result.attempted,
            sent = result.sent,
            failed = result.failed,
            skipped = result.skipped,
            "schedule fired manually"
        );
        Ok(result)
    }

    async fn dispatch_for(
        &self,
        schedule: &EmailSchedule,
        fire_window: DateTime<Utc>,
    ) -> Result<FireResult, PipelineError> {
        let template = self.template_for(schedule).await?;
        let recipients = self.resolver.enumerate(&schedule.audience).await?;

        let logs = self
            .dispatcher
            .dispatch(schedule, &template, &recipients, fire_window)
            .await?;
        Ok(FireResult::from_logs(&logs))
    }

    async fn template_for(
        &self,
        schedule: &EmailSchedule,
    ) -> Result<EmailTemplate, PipelineError> {
        self.store
            .get_template(schedule.template_id)
            .await?
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "schedule {} references missing template {}",
                    schedule.id, schedule.template_id
                ))
            })
    }

    async fn require(&self, id: Uuid) -> Result<EmailSchedule, PipelineError> {
        self.store
            .get_schedule(id)
            .await?
            .ok_or_else(|| PipelineError::Validation(format!("unknown schedule {id}")))
    }
}
