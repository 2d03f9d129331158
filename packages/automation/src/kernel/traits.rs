// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The CRM errors flow through untyped so the dispatcher can classify
// per-recipient vs provider-wide failures.

use async_trait::async_trait;
use crm::models::{Contact, SendReceipt};
use crm::CrmError;

use crate::domains::email::models::Audience;

// =============================================================================
// Contact Resolver Trait (Infrastructure - CRM lookup)
// =============================================================================

#[async_trait]
pub trait BaseContactResolver: Send + Sync {
    /// Resolve a recipient email to a CRM contact. `Ok(None)` means the CRM
    /// has no record for the address.
    async fn resolve(&self, email: &str) -> Result<Option<Contact>, CrmError>;

    /// Enumerate the recipient emails for an audience selector.
    async fn enumerate(&self, audience: &Audience) -> Result<Vec<String>, CrmError>;
}

// =============================================================================
// Email Sender Trait (Infrastructure - transactional send)
// =============================================================================

#[async_trait]
pub trait BaseEmailSender: Send + Sync {
    /// Provider name recorded on every SendLog row.
    fn provider(&self) -> &str;

    /// Send a rendered email to a resolved contact.
    async fn send(
        &self,
        contact_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, CrmError>;
}
