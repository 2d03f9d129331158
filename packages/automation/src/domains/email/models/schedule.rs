use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "schedule_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    Active,
    Paused,
    /// Terminal: a disabled schedule is never resumed; create a new one.
    Disabled,
}

/// Longest accepted recurring interval. Keeps the interval arithmetic in
/// range for chrono (`Duration::seconds` aborts far beyond this).
pub const MAX_EVERY_SECONDS: i64 = 366 * 24 * 60 * 60;

/// When a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// Fires once at the given time, then the schedule is disabled.
    OneShot { at: DateTime<Utc> },
    /// Fires every `seconds` seconds, at most [`MAX_EVERY_SECONDS`] apart.
    Every { seconds: i64 },
}

impl Cadence {
    pub fn is_recurring(&self) -> bool {
        matches!(self, Cadence::Every { .. })
    }

    /// The initial `next_run_at` for a schedule created at `now`.
    pub fn first_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Cadence::OneShot { at } => *at,
            Cadence::Every { seconds } => now + Duration::seconds(*seconds),
        }
    }

    /// The `next_run_at` after a fire at `now`. Recomputed from `now`, not
    /// from the fired window, so an overdue schedule never bursts through
    /// missed intervals.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Cadence::OneShot { .. } => None,
            Cadence::Every { seconds } => Some(now + Duration::seconds(*seconds)),
        }
    }
}

/// Criteria used to enumerate recipients at fire time, resolved by the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Audience {
    /// A named CRM segment.
    Segment(String),
    /// An explicit recipient list.
    Emails(Vec<String>),
}

/// A recurring or one-shot email send.
///
/// For recurring schedules `next_run_at` always lands after `last_run_at`;
/// a manual trigger changes neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct EmailSchedule {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,
    pub category_id: Uuid,
    pub template_id: Uuid,
    pub audience: Audience,
    pub cadence: Cadence,
    #[builder(default)]
    pub status: ScheduleStatus,
    #[builder(default, setter(strip_option))]
    pub last_run_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub next_run_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}
