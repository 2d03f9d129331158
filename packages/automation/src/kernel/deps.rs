//! Dependency container for the pipeline (using traits for testability)
//!
//! One `Deps` is constructed at process start and passed by handle into
//! each engine's constructor - no ambient singleton.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crm::models::{Contact, SendReceipt};
use crm::{CrmError, CrmService};

use crate::config::Config;
use crate::domains::email::models::Audience;
use crate::kernel::rate_limit::RateLimiter;
use crate::kernel::traits::{BaseContactResolver, BaseEmailSender};
use crate::store::{DeploymentStore, EmailStore};

// =============================================================================
// CrmService Adapters (implement the Base* traits)
// =============================================================================

/// Wrapper around CrmService that implements BaseContactResolver
pub struct CrmResolverAdapter(pub Arc<CrmService>);

#[async_trait]
impl BaseContactResolver for CrmResolverAdapter {
    async fn resolve(&self, email: &str) -> Result<Option<Contact>, CrmError> {
        self.0.lookup_contact(email).await
    }

    async fn enumerate(&self, audience: &Audience) -> Result<Vec<String>, CrmError> {
        match audience {
            Audience::Emails(emails) => Ok(emails.clone()),
            Audience::Segment(segment) => self.0.list_segment(segment).await,
        }
    }
}

/// Wrapper around CrmService that implements BaseEmailSender
pub struct CrmSenderAdapter(pub Arc<CrmService>);

#[async_trait]
impl BaseEmailSender for CrmSenderAdapter {
    fn provider(&self) -> &str {
        "crm"
    }

    async fn send(
        &self,
        contact_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, CrmError> {
        self.0.send_email(contact_id, subject, body).await
    }
}

// =============================================================================
// DispatchSettings
// =============================================================================

/// Tunables the engine and dispatcher read per fire.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Max in-flight sends per batch
    pub concurrency: usize,
    /// Timeout applied to each CRM call
    pub send_timeout: Duration,
    /// Per-schedule throttle window
    pub schedule_rate_limit_max: u32,
    pub schedule_rate_limit_window_ms: i64,
    /// How far a throttled fire is pushed back
    pub rate_limit_backoff_secs: i64,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.dispatch_concurrency,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            schedule_rate_limit_max: config.schedule_rate_limit_max,
            schedule_rate_limit_window_ms: config.schedule_rate_limit_window_ms,
            rate_limit_backoff_secs: config.rate_limit_backoff_secs,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            send_timeout: Duration::from_secs(10),
            schedule_rate_limit_max: 10,
            schedule_rate_limit_window_ms: 60_000,
            rate_limit_backoff_secs: 300,
        }
    }
}

// =============================================================================
// Deps
// =============================================================================

/// Pipeline dependencies accessible to the engines
pub struct Deps {
    pub deployments: Arc<dyn DeploymentStore>,
    pub email: Arc<dyn EmailStore>,
    pub resolver: Arc<dyn BaseContactResolver>,
    pub sender: Arc<dyn BaseEmailSender>,
    pub rate_limiter: Arc<RateLimiter>,
    pub settings: DispatchSettings,
}

impl Deps {
    pub fn new(
        deployments: Arc<dyn DeploymentStore>,
        email: Arc<dyn EmailStore>,
        resolver: Arc<dyn BaseContactResolver>,
        sender: Arc<dyn BaseEmailSender>,
        rate_limiter: Arc<RateLimiter>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            deployments,
            email,
            resolver,
            sender,
            rate_limiter,
            settings,
        }
    }
}
