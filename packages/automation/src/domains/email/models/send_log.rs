use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "send_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Failed,
    Skipped,
}

/// One row per (schedule, recipient, attempt). Immutable once written.
///
/// The sole source of truth for delivery statistics and for idempotent
/// retry decisions: a resend checks for an existing `sent` row with the
/// same (schedule_id, recipient_email, fire_window) before sending.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct SendLog {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub recipient_email: String,
    pub provider: String,
    #[builder(default, setter(strip_option))]
    pub provider_message_id: Option<String>,
    pub status: SendStatus,
    #[builder(default, setter(strip_option))]
    pub error: Option<String>,
    /// The due-time instance this attempt belongs to (idempotency key).
    pub fire_window: DateTime<Utc>,
    /// Wall-clock time of the attempt itself.
    #[builder(default = Utc::now())]
    pub sent_at: DateTime<Utc>,
}

/// Filter for the read-only send-log listing.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct SendLogFilter {
    pub schedule_id: Option<Uuid>,
    pub recipient_email: Option<String>,
    pub status: Option<SendStatus>,
    #[builder(default = Page::default(), setter(!strip_option))]
    pub page: Page,
}

/// Aggregate delivery statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow, Default)]
pub struct SendLogStats {
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
}
