//! Category and template management.
//!
//! Pure configuration CRUD: nothing here touches the CRM or the rate
//! limiter. Template content is validated at write time so a broken
//! placeholder can never reach dispatch.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::common::PipelineError;
use crate::store::EmailStore;

use super::models::{EmailCategory, EmailTemplate};
use super::renderer::{RenderedEmail, Template};

pub struct EmailCatalog {
    store: Arc<dyn EmailStore>,
}

impl EmailCatalog {
    pub fn new(store: Arc<dyn EmailStore>) -> Self {
        Self { store }
    }

    // -- categories -----------------------------------------------------

    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<EmailCategory, PipelineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::Validation(
                "category name must not be empty".to_string(),
            ));
        }

        let category = EmailCategory::builder()
            .name(name)
            .description(description.map(str::to_string))
            .build();

        let category = self.store.insert_category(category).await?;
        info!(category_id = %category.id, name, "email category created");
        Ok(category)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Option<EmailCategory>, PipelineError> {
        Ok(self.store.get_category(id).await?)
    }

    pub async fn list_categories(&self) -> Result<Vec<EmailCategory>, PipelineError> {
        Ok(self.store.list_categories().await?)
    }

    /// Delete a category. Refused while any schedule still references it,
    /// regardless of that schedule's status.
    pub async fn delete_category(&self, id: Uuid) -> Result<(), PipelineError> {
        if self.store.get_category(id).await?.is_none() {
            return Err(PipelineError::Validation(format!("unknown category {id}")));
        }
        let referencing = self.store.count_schedules_for_category(id).await?;
        if referencing > 0 {
            return Err(PipelineError::Validation(format!(
                "category {id} is referenced by {referencing} schedule(s)"
            )));
        }

        self.store.delete_category(id).await?;
        info!(category_id = %id, "email category deleted");
        Ok(())
    }

    // -- templates ------------------------------------------------------

    /// Create a template under an existing category. Both subject and body
    /// must parse; broken placeholder syntax is rejected here, not at send
    /// time.
    pub async fn create_template(
        &self,
        category_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<EmailTemplate, PipelineError> {
        if self.store.get_category(category_id).await?.is_none() {
            return Err(PipelineError::Validation(format!(
                "unknown category {category_id}"
            )));
        }
        Template::parse(subject)?;
        Template::parse(body)?;

        let template = EmailTemplate::builder()
            .category_id(category_id)
            .subject(subject)
            .body(body)
            .build();

        let template = self.store.insert_template(template).await?;
        info!(template_id = %template.id, category_id = %category_id, "email template created");
        Ok(template)
    }

    pub async fn get_template(&self, id: Uuid) -> Result<Option<EmailTemplate>, PipelineError> {
        Ok(self.store.get_template(id).await?)
    }

    /// Update subject and/or body. Unspecified fields are left alone; the
    /// new content is validated like on create.
    pub async fn update_template(
        &self,
        id: Uuid,
        subject: Option<&str>,
        body: Option<&str>,
    ) -> Result<EmailTemplate, PipelineError> {
        if self.store.get_template(id).await?.is_none() {
            return Err(PipelineError::Validation(format!("unknown template {id}")));
        }
        if let Some(subject) = subject {
            Template::parse(subject)?;
        }
        if let Some(body) = body {
            Template::parse(body)?;
        }

        let template = self
            .store
            .update_template(id, subject.map(str::to_string), body.map(str::to_string))
            .await?;
        info!(template_id = %id, "email template updated");
        Ok(template)
    }

    /// Copy a template into a fresh row (same category and content, new id).
    pub async fn duplicate_template(&self, id: Uuid) -> Result<EmailTemplate, PipelineError> {
        let original = self
            .store
            .get_template(id)
            .await?
            .ok_or_else(|| PipelineError::Validation(format!("unknown template {id}")))?;

        let copy = self.store.insert_template(original.duplicate()).await?;
        info!(template_id = %copy.id, source_id = %id, "email template duplicated");
        Ok(copy)
    }

    pub async fn list_templates(
        &self,
        category_id: Option<Uuid>,
    ) -> Result<Vec<EmailTemplate>, PipelineError> {
        Ok(self.store.list_templates(category_id).await?)
    }

    /// Render a template against sample personalization data, without
    /// sending anything.
    pub async fn preview_template(
        &self,
        id: Uuid,
        sample: &Value,
    ) -> Result<RenderedEmail, PipelineError> {
        let template = self
            .store
            .get_template(id)
            .await?
            .ok_or_else(|| PipelineError::Validation(format!("unknown template {id}")))?;

        let subject = Template::parse(&template.subject)?;
        let body = Template::parse(&template.body)?;

        Ok(RenderedEmail {
            subject: subject.render(sample),
            body: body.render(sample),
        })
    }
}
