use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Named grouping for templates and schedules ("Holiday", "Onboarding", ...).
///
/// A category can only be deleted while no schedule references it.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct EmailCategory {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,
    pub name: String,
    #[builder(default)]
    pub description: Option<String>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}
