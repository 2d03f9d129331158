//! Record store: durable storage for deployment jobs, email categories,
//! templates, schedules, and send logs.
//!
//! Engines hold no state beyond what they read/write through these traits
//! at the moment of action, which keeps them horizontally restartable.
//! Every conditional update (`transition_job`, `claim_schedule_fire`) is a
//! single compare-and-set so two concurrent callers never double-apply the
//! same transition or double-send the same fire window.
//!
//! Two adapters exist: [`PgStore`] for production and [`MemoryStore`] for
//! tests, with identical semantics.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domains::deployments::models::{
    DeploymentJob, JobFilter, JobPatch, JobStats, JobStatus,
};
use crate::domains::email::models::{
    EmailCategory, EmailSchedule, EmailTemplate, ScheduleStatus, SendLog, SendLogFilter,
    SendLogStats, SendStatus,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors from the persistence layer. `Database` is the fatal class from
/// the pipeline's point of view; it propagates to the invoking trigger.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage contract for deployment jobs.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn insert_job(&self, job: DeploymentJob) -> Result<DeploymentJob, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<DeploymentJob>, StoreError>;

    /// Apply `patch` iff the job's current status is one of `from`.
    /// Returns `None` when the precondition fails (the record is unchanged);
    /// `NotFound` when no such job exists.
    async fn transition_job(
        &self,
        id: Uuid,
        from: &[JobStatus],
        patch: JobPatch,
    ) -> Result<Option<DeploymentJob>, StoreError>;

    /// Append one diagnostic line. Returns `None` when the job is already
    /// terminal (the trail is frozen).
    async fn append_job_log(
        &self,
        id: Uuid,
        line: &str,
    ) -> Result<Option<DeploymentJob>, StoreError>;

    /// Jobs matching `filter`, ordered by creation time descending.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<DeploymentJob>, StoreError>;

    async fn job_stats(&self) -> Result<JobStats, StoreError>;
}

/// Storage contract for the email entities.
#[async_trait]
pub trait EmailStore: Send + Sync {
    // -- categories -----------------------------------------------------

    async fn insert_category(&self, category: EmailCategory)
        -> Result<EmailCategory, StoreError>;
    async fn get_category(&self, id: Uuid) -> Result<Option<EmailCategory>, StoreError>;
    async fn list_categories(&self) -> Result<Vec<EmailCategory>, StoreError>;
    async fn delete_category(&self, id: Uuid) -> Result<(), StoreError>;
    /// Referential guard for category deletion.
    async fn count_schedules_for_category(&self, category_id: Uuid) -> Result<i64, StoreError>;

    // -- templates ------------------------------------------------------

    async fn insert_template(&self, template: EmailTemplate)
        -> Result<EmailTemplate, StoreError>;
    async fn get_template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError>;
    async fn update_template(
        &self,
        id: Uuid,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<EmailTemplate, StoreError>;
    async fn list_templates(
        &self,
        category_id: Option<Uuid>,
    ) -> Result<Vec<EmailTemplate>, StoreError>;

    // -- schedules ------------------------------------------------------

    async fn insert_schedule(&self, schedule: EmailSchedule)
        -> Result<EmailSchedule, StoreError>;
    async fn get_schedule(&self, id: Uuid) -> Result<Option<EmailSchedule>, StoreError>;
    async fn set_schedule_status(
        &self,
        id: Uuid,
        status: ScheduleStatus,
    ) -> Result<EmailSchedule, StoreError>;
    async fn list_schedules(&self) -> Result<Vec<EmailSchedule>, StoreError>;

    /// Active schedules whose `next_run_at` is at or before `now`.
    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<EmailSchedule>, StoreError>;

    /// Claim one fire window: iff the schedule is active and `next_run_at`
    /// still equals `expected_next_run_at`, atomically move it to
    /// `new_next_run_at`/`new_status` (and `last_run_at` when given).
    /// Returns whether this caller won the claim.
    async fn claim_schedule_fire(
        &self,
        id: Uuid,
        expected_next_run_at: DateTime<Utc>,
        new_next_run_at: Option<DateTime<Utc>>,
        last_run_at: Option<DateTime<Utc>>,
        new_status: ScheduleStatus,
    ) -> Result<bool, StoreError>;

    // -- send logs ------------------------------------------------------

    async fn insert_send_log(&self, log: SendLog) -> Result<SendLog, StoreError>;

    /// An existing `sent` row for this (schedule, recipient, fire window),
    /// if any. Basis of the idempotent resend guard.
    async fn find_sent_log(
        &self,
        schedule_id: Uuid,
        recipient_email: &str,
        fire_window: DateTime<Utc>,
    ) -> Result<Option<SendLog>, StoreError>;

    async fn list_send_logs(&self, filter: &SendLogFilter) -> Result<Vec<SendLog>, StoreError>;

    async fn send_log_stats(&self, schedule_id: Option<Uuid>)
        -> Result<SendLogStats, StoreError>;
}

/// Convenience used by adapters when matching a log row's status.
pub(crate) fn send_status_matches(log_status: SendStatus, wanted: Option<SendStatus>) -> bool {
    wanted.map(|s| s == log_status).unwrap_or(true)
}
