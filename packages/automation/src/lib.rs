// Deployment & Email Automation Pipeline
//
// This crate tracks static-site deployment jobs through a bounded state
// machine and schedules, rate-limits, and batch-dispatches templated emails
// to CRM contacts, with per-recipient send logs for replay and statistics.
//
// The HTTP/admin surface lives elsewhere; this crate exposes the typed
// contracts it adapts to requests.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod store;

pub use config::*;
