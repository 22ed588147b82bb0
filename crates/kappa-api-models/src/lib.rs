#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
//! Shared HTTP DTOs for the Kappa API.
//!
//! Request bodies are validated field-by-field in the server, so only response
//! shapes live here. DoseGuard records serialize straight from the data layer.
use chrono::{DateTime, Utc};
use kappa_data::User;
use serde::{Deserialize, Serialize};

/// RFC9457-compatible problem document surfaced on validation/runtime errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Parameters that failed validation, if applicable.
    pub invalid_params: Option<Vec<ProblemInvalidParam>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// `x-request-id` of the failed request, for correlating with server logs.
    pub request_id: Option<String>,
}

/// Invalid parameter pointer surfaced alongside a [`ProblemDetails`] payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemInvalidParam {
    /// JSON Pointer to the offending field.
    pub pointer: String,
    /// Human-readable description of the validation failure.
    pub message: String,
}

/// Account view returned by the auth, user, and admin endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// User id.
    pub id: i64,
    /// API key for the `X-API-Key` header.
    pub api_key: String,
    /// Login name.
    pub username: String,
    /// Permission bitmask.
    pub perms: i64,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_on: Option<DateTime<Utc>>,
    /// Last successful authentication.
    pub last_use: Option<DateTime<Utc>>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            api_key: user.api_key.clone(),
            username: user.username.clone(),
            perms: i64::from(user.perms),
            created_on: user.created_on,
            updated_on: user.updated_on,
            last_use: user.last_use,
        }
    }
}

/// Response body for a successful caregiver login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaregiverLoginResponse {
    /// API key for subsequent DoseGuard calls.
    pub api_key: String,
    /// Caregiver profile id.
    pub caregiver_id: i64,
    /// Login name.
    pub username: String,
}

/// Single-message acknowledgement, used for deletes and unlinks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    /// Message text.
    pub message: String,
}

impl MessageResponse {
    /// Acknowledgement for a soft delete or unlink.
    #[must_use]
    pub fn deleted() -> Self {
        Self {
            message: "Deleted".to_string(),
        }
    }
}

/// Liveness payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: String,
    /// Configured application name.
    pub app: String,
    /// Build identifier.
    pub build_sha: String,
}
