//! Postgres store adapter.
//!
//! All conditional updates are single `UPDATE .. WHERE <precondition>`
//! statements so the compare-and-set happens inside the database; callers
//! learn whether they won from the returned row / row count.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domains::deployments::models::{
    DeploymentJob, JobFilter, JobPatch, JobStats, JobStatus,
};
use crate::domains::email::models::{
    EmailCategory, EmailSchedule, EmailTemplate, ScheduleStatus, SendLog, SendLogFilter,
    SendLogStats,
};

use super::{DeploymentStore, EmailStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn job_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM deployment_jobs WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

/// `audience` and `cadence` are stored as jsonb, so the row mapping is
/// written out instead of derived.
impl sqlx::FromRow<'_, PgRow> for EmailSchedule {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let audience: serde_json::Value = row.try_get("audience")?;
        let cadence: serde_json::Value = row.try_get("cadence")?;

        Ok(EmailSchedule {
            id: row.try_get("id")?,
            category_id: row.try_get("category_id")?,
            template_id: row.try_get("template_id")?,
            audience: serde_json::from_value(audience).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "audience".to_string(),
                    source: Box::new(e),
                }
            })?,
            cadence: serde_json::from_value(cadence).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "cadence".to_string(),
                    source: Box::new(e),
                }
            })?,
            status: row.try_get("status")?,
            last_run_at: row.try_get("last_run_at")?,
            next_run_at: row.try_get("next_run_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl DeploymentStore for PgStore {
    async fn insert_job(&self, job: DeploymentJob) -> Result<DeploymentJob, StoreError> {
        let inserted = sqlx::query_as::<_, DeploymentJob>(
            r#"
            INSERT INTO deployment_jobs (
                id, status, job_type, triggered_by, started_at, completed_at,
                run_id, run_url, build_hash, deployment_url, error, logs,
                metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(job.status)
        .bind(job.job_type)
        .bind(job.triggered_by)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.run_id)
        .bind(&job.run_url)
        .bind(&job.build_hash)
        .bind(&job.deployment_url)
        .bind(&job.error)
        .bind(&job.logs)
        .bind(&job.metadata)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<DeploymentJob>, StoreError> {
        let job = sqlx::query_as::<_, DeploymentJob>(
            "SELECT * FROM deployment_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn transition_job(
        &self,
        id: Uuid,
        from: &[JobStatus],
        patch: JobPatch,
    ) -> Result<Option<DeploymentJob>, StoreError> {
        let job = sqlx::query_as::<_, DeploymentJob>(
            r#"
            UPDATE deployment_jobs SET
                status = $2,
                started_at = COALESCE($3, started_at),
                completed_at = COALESCE($4, completed_at),
                run_id = COALESCE($5, run_id),
                run_url = COALESCE($6, run_url),
                build_hash = COALESCE($7, build_hash),
                deployment_url = COALESCE($8, deployment_url),
                error = COALESCE($9, error),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.status)
        .bind(patch.started_at)
        .bind(patch.completed_at)
        .bind(&patch.run_id)
        .bind(&patch.run_url)
        .bind(&patch.build_hash)
        .bind(&patch.deployment_url)
        .bind(&patch.error)
        .bind(from.to_vec())
        .fetch_optional(&self.pool)
        .await?;

        if job.is_none() && !self.job_exists(id).await? {
            return Err(StoreError::NotFound(id));
        }

        Ok(job)
    }

    async fn append_job_log(
        &self,
        id: Uuid,
        line: &str,
    ) -> Result<Option<DeploymentJob>, StoreError> {
        let job = sqlx::query_as::<_, DeploymentJob>(
            r#"
            UPDATE deployment_jobs
            SET logs = array_append(logs, $2),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(line)
        .fetch_optional(&self.pool)
        .await?;

        if job.is_none() && !self.job_exists(id).await? {
            return Err(StoreError::NotFound(id));
        }

        Ok(job)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<DeploymentJob>, StoreError> {
        let jobs = sqlx::query_as::<_, DeploymentJob>(
            r#"
            SELECT * FROM deployment_jobs
            WHERE ($1::deployment_status IS NULL OR status = $1)
              AND ($2::deployment_type IS NULL OR job_type = $2)
              AND ($3::deployment_trigger IS NULL OR triggered_by = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.status)
        .bind(filter.job_type)
        .bind(filter.triggered_by)
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(filter.page.limit)
        .bind(filter.page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn job_stats(&self) -> Result<JobStats, StoreError> {
        let stats = sqlx::query_as::<_, JobStats>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                   COUNT(*) FILTER (WHERE status = 'running') AS running,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM deployment_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

#[async_trait]
impl EmailStore for PgStore {
    // -- categories -----------------------------------------------------

    async fn insert_category(
        &self,
        category: EmailCategory,
    ) -> Result<EmailCategory, StoreError> {
        let inserted = sqlx::query_as::<_, EmailCategory>(
            r#"
            INSERT INTO email_categories (id, name, description, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<EmailCategory>, StoreError> {
        let category = sqlx::query_as::<_, EmailCategory>(
            "SELECT * FROM email_categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<EmailCategory>, StoreError> {
        let categories = sqlx::query_as::<_, EmailCategory>(
            "SELECT * FROM email_categories ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), StoreError> {
        let deleted = sqlx::query("DELETE FROM email_categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn count_schedules_for_category(&self, category_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM email_schedules WHERE category_id = $1",
        )
        .bind(category_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // -- templates ------------------------------------------------------

    async fn insert_template(
        &self,
        template: EmailTemplate,
    ) -> Result<EmailTemplate, StoreError> {
        let inserted = sqlx::query_as::<_, EmailTemplate>(
            r#"
            INSERT INTO email_templates (id, category_id, subject, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(template.id)
        .bind(template.category_id)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(template.created_at)
        .bind(template.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError> {
        let template = sqlx::query_as::<_, EmailTemplate>(
            "SELECT * FROM email_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(template)
    }

    async fn update_template(
        &self,
        id: Uuid,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<EmailTemplate, StoreError> {
        let template = sqlx::query_as::<_, EmailTemplate>(
            r#"
            UPDATE email_templates SET
                subject = COALESCE($2, subject),
                body = COALESCE($3, body),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(subject)
        .bind(body)
        .fetch_optional(&self.pool)
        .await?;

        template.ok_or(StoreError::NotFound(id))
    }

    async fn list_templates(
        &self,
        category_id: Option<Uuid>,
    ) -> Result<Vec<EmailTemplate>, StoreError> {
        let templates = sqlx::query_as::<_, EmailTemplate>(
            r#"
            SELECT * FROM email_templates
            WHERE ($1::uuid IS NULL OR category_id = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }

    // -- schedules ------------------------------------------------------

    async fn insert_schedule(
        &self,
        schedule: EmailSchedule,
    ) -> Result<EmailSchedule, StoreError> {
        let audience = serde_json::to_value(&schedule.audience)?;
        let cadence = serde_json::to_value(&schedule.cadence)?;

        let inserted = sqlx::query_as::<_, EmailSchedule>(
            r#"
            INSERT INTO email_schedules (
                id, category_id, template_id, audience, cadence, status,
                last_run_at, next_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.category_id)
        .bind(schedule.template_id)
        .bind(audience)
        .bind(cadence)
        .bind(schedule.status)
        .bind(schedule.last_run_at)
        .bind(schedule.next_run_at)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<EmailSchedule>, StoreError> {
        let schedule = sqlx::query_as::<_, EmailSchedule>(
            "SELECT * FROM email_schedules WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(schedule)
    }

    async fn set_schedule_status(
        &self,
        id: Uuid,
        status: ScheduleStatus,
    ) -> Result<EmailSchedule, StoreError> {
        let schedule = sqlx::query_as::<_, EmailSchedule>(
            r#"
            UPDATE email_schedules SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        schedule.ok_or(StoreError::NotFound(id))
    }

    async fn list_schedules(&self) -> Result<Vec<EmailSchedule>, StoreError> {
        let schedules = sqlx::query_as::<_, EmailSchedule>(
            "SELECT * FROM email_schedules ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(schedules)
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<EmailSchedule>, StoreError> {
        let schedules = sqlx::query_as::<_, EmailSchedule>(
            r#"
            SELECT * FROM email_schedules
            WHERE status = 'active'
              AND next_run_at IS NOT NULL
              AND next_run_at <= $1
            ORDER BY next_run_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(schedules)
    }

    async fn claim_schedule_fire(
        &self,
        id: Uuid,
        expected_next_run_at: DateTime<Utc>,
        new_next_run_at: Option<DateTime<Utc>>,
        last_run_at: Option<DateTime<Utc>>,
        new_status: ScheduleStatus,
    ) -> Result<bool, StoreError> {
        let claimed = sqlx::query(
            r#"
            UPDATE email_schedules SET
                next_run_at = $3,
                last_run_at = COALESCE($4, last_run_at),
                status = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active' AND next_run_at = $2
            "#,
        )
        .bind(id)
        .bind(expected_next_run_at)
        .bind(new_next_run_at)
        .bind(last_run_at)
        .bind(new_status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(claimed == 1)
    }

    // -- send logs ------------------------------------------------------

    async fn insert_send_log(&self, log: SendLog) -> Result<SendLog, StoreError> {
        let inserted = sqlx::query_as::<_, SendLog>(
            r#"
            INSERT INTO email_send_logs (
                id, schedule_id, recipient_email, provider, provider_message_id,
                status, error, fire_window, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(log.id)
        .bind(log.schedule_id)
        .bind(&log.recipient_email)
        .bind(&log.provider)
        .bind(&log.provider_message_id)
        .bind(log.status)
        .bind(&log.error)
        .bind(log.fire_window)
        .bind(log.sent_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn find_sent_log(
        &self,
        schedule_id: Uuid,
        recipient_email: &str,
        fire_window: DateTime<Utc>,
    ) -> Result<Option<SendLog>, StoreError> {
        let log = sqlx::query_as::<_, SendLog>(
            r#"
            SELECT * FROM email_send_logs
            WHERE schedule_id = $1
              AND recipient_email = $2
              AND fire_window = $3
              AND status = 'sent'
            LIMIT 1
            "#,
        )
        .bind(schedule_id)
        .bind(recipient_email)
        .bind(fire_window)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    async fn list_send_logs(&self, filter: &SendLogFilter) -> Result<Vec<SendLog>, StoreError> {
        let logs = sqlx::query_as::<_, SendLog>(
            r#"
            SELECT * FROM email_send_logs
            WHERE ($1::uuid IS NULL OR schedule_id = $1)
              AND ($2::text IS NULL OR recipient_email = $2)
              AND ($3::send_status IS NULL OR status = $3)
            ORDER BY sent_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.schedule_id)
        .bind(&filter.recipient_email)
        .bind(filter.status)
        .bind(filter.page.limit)
        .bind(filter.page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn send_log_stats(
        &self,
        schedule_id: Option<Uuid>,
    ) -> Result<SendLogStats, StoreError> {
        let stats = sqlx::query_as::<_, SendLogStats>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                   COUNT(*) FILTER (WHERE status = 'skipped') AS skipped
            FROM email_send_logs
            WHERE ($1::uuid IS NULL OR schedule_id = $1)
            "#,
        )
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}
