use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// An email template with `{{token}}` personalization placeholders in the
/// subject and body.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct EmailTemplate {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,
    pub category_id: Uuid,
    pub subject: String,
    pub body: String,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl EmailTemplate {
    /// A copy with a fresh id and timestamps, used by template duplication.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::now_v7(),
            category_id: self.category_id,
            subject: self.subject.clone(),
            body: self.body.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_gets_a_fresh_id_and_copied_content() {
        let original = EmailTemplate::builder()
            .category_id(Uuid::now_v7())
            .subject("Hi {{first_name}}")
            .body("Welcome aboard")
            .build();

        let copy = original.duplicate();
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.category_id, original.category_id);
        assert_eq!(copy.subject, original.subject);
        assert_eq!(copy.body, original.body);
    }
}
