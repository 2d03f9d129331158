//! Deployment job tracking.
//!
//! One record per deployment attempt, driven through a bounded state
//! machine by an external build runner's start/finish signals:
//!
//! ```text
//! pending ──► running ──► completed
//!    │           ├──────► failed
//!    │           └──────► cancelled
//!    ├──────────────────► failed
//!    └──────────────────► cancelled
//! ```
//!
//! No transition leaves a terminal state. All transitions are
//! compare-and-set against the store so racing status reports from a
//! retrying runner cannot corrupt a record.

pub mod models;
pub mod tracker;

pub use models::{DeploymentJob, JobFilter, JobPatch, JobStats, JobStatus, JobType, TriggeredBy};
pub use tracker::DeploymentTracker;
