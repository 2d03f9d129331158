//! Deployment job tracker.
//!
//! Owns the job state machine. Every transition is a single
//! compare-and-set against the store, so concurrent status reports from a
//! retrying build runner resolve to exactly one winner and the loser gets
//! `InvalidTransition` with the record untouched.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::common::PipelineError;
use crate::store::{DeploymentStore, StoreError};

use super::models::{DeploymentJob, JobFilter, JobPatch, JobStats, JobStatus, JobType, TriggeredBy};

pub struct DeploymentTracker {
    store: Arc<dyn DeploymentStore>,
}

impl DeploymentTracker {
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self { store }
    }

    /// Create a new job in status `pending`. Always succeeds.
    pub async fn create(
        &self,
        job_type: JobType,
        triggered_by: TriggeredBy,
        metadata: Value,
    ) -> Result<DeploymentJob, PipelineError> {
        let job = DeploymentJob::builder()
            .job_type(job_type)
            .triggered_by(triggered_by)
            .metadata(metadata)
            .build();

        let job = self.store.insert_job(job).await?;
        info!(job_id = %job.id, ?job_type, ?triggered_by, "deployment job created");
        Ok(job)
    }

    /// The external runner accepted the job: pending → running.
    pub async fn mark_running(
        &self,
        job_id: Uuid,
        run_id: &str,
        run_url: Option<&str>,
    ) -> Result<DeploymentJob, PipelineError> {
        let patch = JobPatch {
            status: JobStatus::Running,
            started_at: Some(Utc::now()),
            run_id: Some(run_id.to_string()),
            run_url: run_url.map(str::to_string),
            ..JobPatch::default()
        };

        let job = self
            .transition(job_id, &[JobStatus::Pending], patch, JobStatus::Running)
            .await?;
        info!(job_id = %job.id, run_id, "deployment job running");
        Ok(job)
    }

    /// The runner reported success: running → completed.
    pub async fn mark_completed(
        &self,
        job_id: Uuid,
        build_hash: &str,
        deployment_url: &str,
    ) -> Result<DeploymentJob, PipelineError> {
        let patch = JobPatch {
            status: JobStatus::Completed,
            completed_at: Some(Utc::now()),
            build_hash: Some(build_hash.to_string()),
            deployment_url: Some(deployment_url.to_string()),
            ..JobPatch::default()
        };

        let job = self
            .transition(job_id, &[JobStatus::Running], patch, JobStatus::Completed)
            .await?;
        info!(job_id = %job.id, build_hash, "deployment job completed");
        Ok(job)
    }

    /// The runner (or the trigger itself) reported failure. Allowed from
    /// pending or running.
    pub async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
    ) -> Result<DeploymentJob, PipelineError> {
        let patch = JobPatch {
            status: JobStatus::Failed,
            completed_at: Some(Utc::now()),
            error: Some(error.to_string()),
            ..JobPatch::default()
        };

        let job = self
            .transition(
                job_id,
                &[JobStatus::Pending, JobStatus::Running],
                patch,
                JobStatus::Failed,
            )
            .await?;
        info!(job_id = %job.id, error, "deployment job failed");
        Ok(job)
    }

    /// Mark the job cancelled. Only marks state: an in-flight external
    /// build is not interrupted and will report its own terminal outcome,
    /// which then loses the compare-and-set.
    pub async fn cancel(&self, job_id: Uuid) -> Result<DeploymentJob, PipelineError> {
        let patch = JobPatch {
            status: JobStatus::Cancelled,
            completed_at: Some(Utc::now()),
            ..JobPatch::default()
        };

        let job = self
            .transition(
                job_id,
                &[JobStatus::Pending, JobStatus::Running],
                patch,
                JobStatus::Cancelled,
            )
            .await?;
        info!(job_id = %job.id, "deployment job cancelled");
        Ok(job)
    }

    /// Append one diagnostic line to the job's trail. Rejected with
    /// `LogAfterTerminal` once the job reached a terminal status.
    pub async fn append_log(&self, job_id: Uuid, line: &str) -> Result<(), PipelineError> {
        match self.store.append_job_log(job_id, line).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(PipelineError::LogAfterTerminal(job_id)),
            Err(StoreError::NotFound(_)) => {
                Err(PipelineError::Validation(format!("unknown job {job_id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<DeploymentJob>, PipelineError> {
        Ok(self.store.get_job(job_id).await?)
    }

    /// Jobs matching `filter`, newest first.
    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<DeploymentJob>, PipelineError> {
        Ok(self.store.list_jobs(filter).await?)
    }

    /// Point-in-time aggregate count by status.
    pub async fn stats(&self) -> Result<JobStats, PipelineError> {
        Ok(self.store.job_stats().await?)
    }

    async fn transition(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        patch: JobPatch,
        to: JobStatus,
    ) -> Result<DeploymentJob, PipelineError> {
        match self.store.transition_job(job_id, from, patch).await {
            Ok(Some(job)) => Ok(job),
            Ok(None) => {
                let current = self
                    .store
                    .get_job(job_id)
                    .await?
                    .ok_or_else(|| PipelineError::Validation(format!("unknown job {job_id}")))?;
                Err(PipelineError::InvalidTransition {
                    id: job_id,
                    from: current.status,
                    to,
                })
            }
            Err(StoreError::NotFound(_)) => {
                Err(PipelineError::Validation(format!("unknown job {job_id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
