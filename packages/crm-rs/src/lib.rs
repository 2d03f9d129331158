//! Minimal client for the CRM's contact and transactional-send API.
//!
//! Covers the three endpoints the automation pipeline consumes:
//! contact lookup by email, segment membership listing, and sending a
//! rendered email to a contact.

pub mod models;

use reqwest::{header, Client, StatusCode};
use serde_json::json;

use crate::models::{ApiError, Contact, SegmentResponse, SendReceipt};

/// Errors surfaced by the CRM client.
///
/// `Auth` is the provider-fatal case: once the CRM rejects our credentials,
/// every subsequent call in a batch will fail the same way.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("CRM rejected credentials")]
    Auth,
    #[error("CRM returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request to CRM timed out")]
    Timeout,
    #[error("CRM transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl CrmError {
    /// Whether this failure affects the whole provider rather than one
    /// recipient. Callers stop batching once they see a fatal error.
    pub fn is_provider_fatal(&self) -> bool {
        matches!(self, CrmError::Auth)
    }
}

#[derive(Debug, Clone)]
pub struct CrmOptions {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct CrmService {
    options: CrmOptions,
    client: Client,
}

impl CrmService {
    pub fn new(options: CrmOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    /// Look up a contact by email address. Returns `Ok(None)` when the CRM
    /// has no record for the address.
    pub async fn lookup_contact(&self, email: &str) -> Result<Option<Contact>, CrmError> {
        let url = format!("{}/v1/contacts/lookup", self.options.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("email", email)])
            .header(header::AUTHORIZATION, self.bearer())
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Contact>().await?)),
            status => Err(Self::classify(status, response).await),
        }
    }

    /// List the email addresses belonging to a named segment.
    pub async fn list_segment(&self, segment: &str) -> Result<Vec<String>, CrmError> {
        let url = format!("{}/v1/segments/{}/members", self.options.base_url, segment);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.bearer())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify(status, response).await);
        }

        let body = response.json::<SegmentResponse>().await?;
        Ok(body.members.into_iter().map(|m| m.email).collect())
    }

    /// Send a rendered email to a contact. Returns the provider message id.
    pub async fn send_email(
        &self,
        contact_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, CrmError> {
        let url = format!("{}/v1/emails/send", self.options.base_url);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.bearer())
            .json(&json!({
                "contact_id": contact_id,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify(status, response).await);
        }

        Ok(response.json::<SendReceipt>().await?)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.options.api_key)
    }

    /// Map a non-2xx response to a `CrmError`, preferring the CRM's own
    /// error message when the body parses.
    async fn classify(status: StatusCode, response: reqwest::Response) -> CrmError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return CrmError::Auth;
        }

        let body = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ApiError>(&body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(body);

        CrmError::Http {
            status: status.as_u16(),
            body,
        }
    }
}
