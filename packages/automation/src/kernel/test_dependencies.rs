// TestDependencies - mock implementations for testing
//
// Provides mock CRM services that can be injected into Deps for tests.
// The in-memory store lives in `store::memory`; these cover the two
// network-facing traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use crm::models::{Contact, SendReceipt};
use crm::CrmError;
use serde_json::Value;

use crate::domains::email::models::Audience;
use crate::kernel::traits::{BaseContactResolver, BaseEmailSender};

/// Scripted CRM failure, convertible to a fresh `CrmError` per call.
#[derive(Debug, Clone)]
pub enum MockCrmError {
    Auth,
    Http(u16, String),
    Timeout,
}

impl MockCrmError {
    fn to_error(&self) -> CrmError {
        match self {
            MockCrmError::Auth => CrmError::Auth,
            MockCrmError::Http(status, body) => CrmError::Http {
                status: *status,
                body: body.clone(),
            },
            MockCrmError::Timeout => CrmError::Timeout,
        }
    }
}

// =============================================================================
// Mock Contact Resolver
// =============================================================================

#[derive(Default)]
pub struct MockContactResolver {
    contacts: Mutex<HashMap<String, Contact>>,
    segments: Mutex<HashMap<String, Vec<String>>>,
    errors: Mutex<HashMap<String, MockCrmError>>,
    resolve_calls: Mutex<Vec<String>>,
}

impl MockContactResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolvable contact with personalization fields.
    pub fn with_contact(self, email: &str, fields: Value) -> Self {
        let contact = Contact {
            contact_id: format!("contact-{email}"),
            email: email.to_string(),
            fields,
        };
        self.contacts.lock().unwrap().insert(email.to_string(), contact);
        self
    }

    /// Register a named segment's membership.
    pub fn with_segment(self, segment: &str, emails: &[&str]) -> Self {
        self.segments.lock().unwrap().insert(
            segment.to_string(),
            emails.iter().map(|e| e.to_string()).collect(),
        );
        self
    }

    /// Make resolution for `email` fail with the given error.
    pub fn with_resolve_error(self, email: &str, error: MockCrmError) -> Self {
        self.errors.lock().unwrap().insert(email.to_string(), error);
        self
    }

    /// Emails that were resolved, in call order.
    pub fn resolve_calls(&self) -> Vec<String> {
        self.resolve_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseContactResolver for MockContactResolver {
    async fn resolve(&self, email: &str) -> Result<Option<Contact>, CrmError> {
        self.resolve_calls.lock().unwrap().push(email.to_string());

        if let Some(error) = self.errors.lock().unwrap().get(email) {
            return Err(error.to_error());
        }

        Ok(self.contacts.lock().unwrap().get(email).cloned())
    }

    async fn enumerate(&self, audience: &Audience) -> Result<Vec<String>, CrmError> {
        match audience {
            Audience::Emails(emails) => Ok(emails.clone()),
            Audience::Segment(segment) => Ok(self
                .segments
                .lock()
                .unwrap()
                .get(segment)
                .cloned()
                .unwrap_or_default()),
        }
    }
}

// =============================================================================
// Mock Email Sender
// =============================================================================

/// Arguments captured from a send call
#[derive(Debug, Clone)]
pub struct SendCallArgs {
    pub contact_id: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct MockEmailSender {
    errors: Mutex<HashMap<String, MockCrmError>>,
    send_calls: Mutex<Vec<SendCallArgs>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to `contact_id` fail with the given error.
    pub fn with_send_error(self, contact_id: &str, error: MockCrmError) -> Self {
        self.errors
            .lock()
            .unwrap()
            .insert(contact_id.to_string(), error);
        self
    }

    /// Sends attempted against this mock, in call order.
    pub fn send_calls(&self) -> Vec<SendCallArgs> {
        self.send_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseEmailSender for MockEmailSender {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        contact_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, CrmError> {
        let mut calls = self.send_calls.lock().unwrap();
        calls.push(SendCallArgs {
            contact_id: contact_id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        let sequence = calls.len();
        drop(calls);

        if let Some(error) = self.errors.lock().unwrap().get(contact_id) {
            return Err(error.to_error());
        }

        Ok(SendReceipt {
            message_id: format!("mock-message-{sequence}"),
        })
    }
}
