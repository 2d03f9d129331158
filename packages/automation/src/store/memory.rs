//! In-memory store adapter.
//!
//! Mirrors the compare-and-set semantics of the Postgres adapter behind a
//! single mutex. Used by unit and integration tests so the pipeline can be
//! exercised without a database.

use std::collections::HashMap;
use std::sync::Mutex;

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

use super::{send_status_matches, DeploymentStore, EmailStore, StoreError};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, DeploymentJob>,
    categories: HashMap<Uuid, EmailCategory>,
    templates: HashMap<Uuid, EmailTemplate>,
    schedules: HashMap<Uuid, EmailSchedule>,
    send_logs: Vec<SendLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_patch(job: &mut DeploymentJob, patch: &JobPatch) {
    job.status = patch.status;
    if let Some(at) = patch.started_at {
        job.started_at = Some(at);
    }
    if let Some(at) = patch.completed_at {
        job.completed_at = Some(at);
    }
    if let Some(run_id) = &patch.run_id {
        job.run_id = Some(run_id.clone());
    }
    if let Some(run_url) = &patch.run_url {
        job.run_url = Some(run_url.clone());
    }
    if let Some(hash) = &patch.build_hash {
        job.build_hash = Some(hash.clone());
    }
    if let Some(url) = &patch.deployment_url {
        job.deployment_url = Some(url.clone());
    }
    if let Some(error) = &patch.error {
        job.error = Some(error.clone());
    }
    job.updated_at = Utc::now();
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert_job(&self, job: DeploymentJob) -> Result<DeploymentJob, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<DeploymentJob>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn transition_job(
        &self,
        id: Uuid,
        from: &[JobStatus],
        patch: JobPatch,
    ) -> Result<Option<DeploymentJob>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !from.contains(&job.status) {
            return Ok(None);
        }

        apply_patch(job, &patch);
        Ok(Some(job.clone()))
    }

    async fn append_job_log(
        &self,
        id: Uuid,
        line: &str,
    ) -> Result<Option<DeploymentJob>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.status.is_terminal() {
            return Ok(None);
        }

        job.logs.push(line.to_string());
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<DeploymentJob>, StoreError> {
        let inner = self.inner.lock().unwrap();

        let mut jobs: Vec<DeploymentJob> = inner
            .jobs
            .values()
            .filter(|j| filter.status.map(|s| j.status == s).unwrap_or(true))
            .filter(|j| filter.job_type.map(|t| j.job_type == t).unwrap_or(true))
            .filter(|j| {
                filter
                    .triggered_by
                    .map(|t| j.triggered_by == t)
                    .unwrap_or(true)
            })
            .filter(|j| filter.created_after.map(|t| j.created_at >= t).unwrap_or(true))
            .filter(|j| filter.created_before.map(|t| j.created_at <= t).unwrap_or(true))
            .cloned()
            .collect();

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(jobs
            .into_iter()
            .skip(filter.page.offset as usize)
            .take(filter.page.limit as usize)
            .collect())
    }

    async fn job_stats(&self) -> Result<JobStats, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut stats = JobStats::default();

        for job in inner.jobs.values() {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => {}
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl EmailStore for MemoryStore {
    // -- categories -----------------------------------------------------

    async fn insert_category(
        &self,
        category: EmailCategory,
    ) -> Result<EmailCategory, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<EmailCategory>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<EmailCategory>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut categories: Vec<_> = inner.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(categories)
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .categories
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn count_schedules_for_category(&self, category_id: Uuid) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .schedules
            .values()
            .filter(|s| s.category_id == category_id)
            .count() as i64)
    }

    // -- templates ------------------------------------------------------

    async fn insert_template(
        &self,
        template: EmailTemplate,
    ) -> Result<EmailTemplate, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.templates.get(&id).cloned())
    }

    async fn update_template(
        &self,
        id: Uuid,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<EmailTemplate, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let template = inner.templates.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if let Some(subject) = subject {
            template.subject = subject;
        }
        if let Some(body) = body {
            template.body = body;
        }
        template.updated_at = Utc::now();
        Ok(template.clone())
    }

    async fn list_templates(
        &self,
        category_id: Option<Uuid>,
    ) -> Result<Vec<EmailTemplate>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut templates: Vec<_> = inner
            .templates
            .values()
            .filter(|t| category_id.map(|c| t.category_id == c).unwrap_or(true))
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(templates)
    }

    // -- schedules ------------------------------------------------------

    async fn insert_schedule(
        &self,
        schedule: EmailSchedule,
    ) -> Result<EmailSchedule, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<EmailSchedule>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.schedules.get(&id).cloned())
    }

    async fn set_schedule_status(
        &self,
        id: Uuid,
        status: ScheduleStatus,
    ) -> Result<EmailSchedule, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let schedule = inner.schedules.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        schedule.status = status;
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn list_schedules(&self) -> Result<Vec<EmailSchedule>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut schedules: Vec<_> = inner.schedules.values().cloned().collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(schedules)
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<EmailSchedule>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<_> = inner
            .schedules
            .values()
            .filter(|s| s.status == ScheduleStatus::Active)
            .filter(|s| s.next_run_at.map(|t| t <= now).unwrap_or(false))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        Ok(due)
    }

    async fn claim_schedule_fire(
        &self,
        id: Uuid,
        expected_next_run_at: DateTime<Utc>,
        new_next_run_at: Option<DateTime<Utc>>,
        last_run_at: Option<DateTime<Utc>>,
        new_status: ScheduleStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let schedule = inner.schedules.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if schedule.status != ScheduleStatus::Active
            || schedule.next_run_at != Some(expected_next_run_at)
        {
            return Ok(false);
        }

        schedule.next_run_at = new_next_run_at;
        if let Some(at) = last_run_at {
            schedule.last_run_at = Some(at);
        }
        schedule.status = new_status;
        schedule.updated_at = Utc::now();
        Ok(true)
    }

    // -- send logs ------------------------------------------------------

    async fn insert_send_log(&self, log: SendLog) -> Result<SendLog, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.send_logs.push(log.clone());
        Ok(log)
    }

    async fn find_sent_log(
        &self,
        schedule_id: Uuid,
        recipient_email: &str,
        fire_window: DateTime<Utc>,
    ) -> Result<Option<SendLog>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .send_logs
            .iter()
            .find(|l| {
                l.schedule_id == schedule_id
                    && l.recipient_email == recipient_email
                    && l.fire_window == fire_window
                    && l.status == SendStatus::Sent
            })
            .cloned())
    }

    async fn list_send_logs(&self, filter: &SendLogFilter) -> Result<Vec<SendLog>, StoreError> {
        let inner = self.inner.lock().unwrap();

        let mut logs: Vec<_> = inner
            .send_logs
            .iter()
            .filter(|l| filter.schedule_id.map(|s| l.schedule_id == s).unwrap_or(true))
            .filter(|l| {
                filter
                    .recipient_email
                    .as_deref()
                    .map(|r| l.recipient_email == r)
                    .unwrap_or(true)
            })
            .filter(|l| send_status_matches(l.status, filter.status))
            .cloned()
            .collect();

        logs.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

        Ok(logs
            .into_iter()
            .skip(filter.page.offset as usize)
            .take(filter.page.limit as usize)
            .collect())
    }

    async fn send_log_stats(
        &self,
        schedule_id: Option<Uuid>,
    ) -> Result<SendLogStats, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut stats = SendLogStats::default();

        for log in inner
            .send_logs
            .iter()
            .filter(|l| schedule_id.map(|s| l.schedule_id == s).unwrap_or(true))
        {
            stats.total += 1;
            match log.status {
                SendStatus::Sent => stats.sent += 1,
                SendStatus::Failed => stats.failed += 1,
                SendStatus::Skipped => stats.skipped += 1,
            }
        }

        Ok(stats)
    }
}
