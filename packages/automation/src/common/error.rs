//! Error taxonomy for the pipeline.
//!
//! Every operation returns a success payload or one of these enumerated
//! kinds; raw error strings never thread through callers. Per-recipient
//! failures (resolution, provider) are not errors at this level: they are
//! recorded as `SendLog` rows and the batch continues.

use uuid::Uuid;

use crate::domains::deployments::models::JobStatus;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed input (unknown category id, schedule not due, ...).
    /// Rejected before any state mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A state-machine edge that does not exist. The stored record is
    /// unchanged.
    #[error("invalid transition for job {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// Diagnostic log append on a job that already reached a terminal
    /// status. Rejected rather than silently dropped.
    #[error("job {0} is terminal, log line rejected")]
    LogAfterTerminal(Uuid),

    /// The guarded actor exhausted its attempt window. Scheduled fires
    /// turn this into a deferred reschedule; manual triggers surface it.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Broken template syntax. A configuration error, fatal to the whole
    /// batch before any log is written.
    #[error("template error: {0}")]
    Template(String),

    /// Batch-level CRM failure (audience enumeration). Per-recipient CRM
    /// failures become SendLog rows instead.
    #[error(transparent)]
    Crm(#[from] crm::CrmError),

    /// Persistence unavailable. The only class fatal to the operation;
    /// propagates untouched and no partial state is assumed committed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
