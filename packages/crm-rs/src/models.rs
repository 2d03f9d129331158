//! Response models for the CRM REST API.

use serde::{Deserialize, Serialize};

/// A contact record as the CRM returns it from a lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Opaque CRM-side identifier, used for sends.
    pub contact_id: String,
    pub email: String,
    /// Personalization fields (first name, company, ...) as a flat object.
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// A single entry from a segment listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMember {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub members: Vec<SegmentMember>,
}

/// Acknowledgement returned by the send endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Error body the CRM returns on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
