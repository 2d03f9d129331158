//! Email automation: categories, templates, schedules, and batch dispatch.
//!
//! ```text
//! tick (cron) ──► ScheduleEngine::due_schedules(now)
//!                     └─► for each due schedule
//!                             ScheduleEngine::fire(id, now)
//!                                 ├─► RateLimiter (throttled → defer)
//!                                 ├─► claim fire window (compare-and-set)
//!                                 └─► Dispatcher::dispatch
//!                                         ├─► resolve contact (CRM)
//!                                         ├─► render template
//!                                         ├─► send (CRM)
//!                                         └─► one SendLog per recipient
//! ```

pub mod catalog;
pub mod dispatcher;
pub mod engine;
pub mod models;
pub mod renderer;

pub use catalog::EmailCatalog;
pub use dispatcher::Dispatcher;
pub use engine::{FireResult, ScheduleEngine};
pub use renderer::{RenderedEmail, Template};
