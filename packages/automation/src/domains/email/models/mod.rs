pub mod category;
pub mod schedule;
pub mod send_log;
pub mod template;

pub use category::EmailCategory;
pub use schedule::{Audience, Cadence, EmailSchedule, ScheduleStatus, MAX_EVERY_SECONDS};
pub use send_log::{SendLog, SendLogFilter, SendLogStats, SendStatus};
pub use template::EmailTemplate;
