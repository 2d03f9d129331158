//! Test fixtures for creating email catalog data.

use automation_core::common::PipelineError;
use automation_core::domains::email::models::{EmailCategory, EmailTemplate};

use super::TestHarness;

pub const SAMPLE_SUBJECT: &str = "Hi {{first_name}}";
pub const SAMPLE_BODY: &str = "Hello {{first_name}}, news for {{email}}!";

/// Create a category named "Newsletter".
pub async fn seed_category(harness: &TestHarness) -> Result<EmailCategory, PipelineError> {
    harness
        .catalog()
        .create_category("Newsletter", Some("Weekly updates"))
        .await
}

/// Create a category plus a template with the sample personalization
/// placeholders.
pub async fn seed_catalog(
    harness: &TestHarness,
) -> Result<(EmailCategory, EmailTemplate), PipelineError> {
    let category = seed_category(harness).await?;
    let template = harness
        .catalog()
        .create_template(category.id, SAMPLE_SUBJECT, SAMPLE_BODY)
        .await?;
    Ok((category, template))
}
