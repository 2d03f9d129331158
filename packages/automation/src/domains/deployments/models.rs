//! Deployment job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::Page;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "deployment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether any further transition is permitted from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "deployment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    StaticExport,
    FullDeploy,
    WordpressSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "deployment_trigger", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    Wordpress,
    Manual,
    Api,
}

// ============================================================================
// Deployment Job Model
// ============================================================================

/// One deployment attempt.
///
/// Invariants (enforced by [`DeploymentTracker`](super::DeploymentTracker)
/// through patch construction, verified by tests after every mutation):
/// - `completed_at` is set iff status is terminal
/// - `error` is set iff status is `failed`
/// - `run_id` is stored by the pending → running transition
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct DeploymentJob {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    #[builder(default)]
    pub status: JobStatus,
    pub job_type: JobType,
    pub triggered_by: TriggeredBy,

    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,

    // External build-system references, set once the runner accepts the job
    #[builder(default, setter(strip_option))]
    pub run_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub run_url: Option<String>,

    // Set only on completion
    #[builder(default, setter(strip_option))]
    pub build_hash: Option<String>,
    #[builder(default, setter(strip_option))]
    pub deployment_url: Option<String>,

    // Set only on failure
    #[builder(default, setter(strip_option))]
    pub error: Option<String>,

    /// Append-only diagnostic trail. Frozen by the terminal transition.
    #[builder(default)]
    pub logs: Vec<String>,

    /// Caller-supplied context (post id/slug/title, ...)
    #[builder(default = serde_json::json!({}))]
    pub metadata: serde_json::Value,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Patch / filter / stats
// ============================================================================

/// Field set applied atomically by a status transition.
///
/// `None` leaves the stored column untouched, so a patch can never unset a
/// value that an earlier transition wrote.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub run_id: Option<String>,
    pub run_url: Option<String>,
    pub build_hash: Option<String>,
    pub deployment_url: Option<String>,
    pub error: Option<String>,
}

/// Filter for listing deployment jobs, ordered by creation time descending.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub triggered_by: Option<TriggeredBy>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    #[builder(default = Page::default(), setter(!strip_option))]
    pub page: Page,
}

/// Point-in-time aggregate count by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow, Default)]
pub struct JobStats {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> DeploymentJob {
        DeploymentJob::builder()
            .job_type(JobType::StaticExport)
            .triggered_by(TriggeredBy::Manual)
            .build()
    }

    #[test]
    fn new_job_starts_pending_with_no_timestamps() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.run_id.is_none());
    }

    #[test]
    fn new_job_has_empty_log_trail() {
        let job = sample_job();
        assert!(job.logs.is_empty());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
