// Error types per boundary, plus the per-tenant collection taxonomy.

use thiserror::Error;

use crate::models::truncate_chars;

/// Body preview length carried by management-API errors.
pub const MAX_BODY_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("resource {external_id} already belongs to another tenant")]
    OwnershipConflict { external_id: String },

    #[error("invalid data: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {reference} not found")]
    NotFound { reference: String },

    #[error("access to secret {reference} denied (HTTP {status})")]
    AccessDenied { reference: String, status: u16 },

    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ResourceApiError {
    #[error("token request rejected: {0}")]
    Authentication(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ResourceApiError {
    pub fn status(status: u16, body: &str) -> Self {
        ResourceApiError::Status {
            status,
            body: truncate_chars(body.trim(), MAX_BODY_PREVIEW_CHARS),
        }
    }
}

impl From<reqwest::Error> for ResourceApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ResourceApiError::Timeout(e.to_string())
        } else if e.is_decode() {
            ResourceApiError::Decode(e.to_string())
        } else {
            ResourceApiError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("lease store transport error: {0}")]
    Transport(String),

    #[error("lease store credential error: {0}")]
    Credential(String),
}

/// Why a single tenant's collection stopped. Never escapes the tenant task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("Client secret could not be resolved from the secret store: {0}")]
    SecretUnavailable(String),

    #[error("Service principal authentication failed. Secret may be expired or invalid: {0}")]
    AuthenticationFailed(String),

    #[error(
        "Management API authorization failed (HTTP {status}). Check service principal permissions."
    )]
    AuthorizationFailed { status: u16 },

    #[error("Management API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Unexpected error: {0}")]
    CollectionFailed(String),
}

impl CollectionError {
    /// Stable classification used in logs, health messages and cycle reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectionError::SecretUnavailable(_) | CollectionError::AuthenticationFailed(_) => {
                "authentication_failed"
            }
            CollectionError::AuthorizationFailed { .. } => "authorization_failed",
            CollectionError::ApiError { .. } => "api_error",
            CollectionError::CollectionFailed(_) => "collection_failed",
        }
    }

    /// Classify a failed resource listing: 401/403 are authorization, other statuses API errors.
    pub fn from_listing(e: ResourceApiError) -> Self {
        match e {
            ResourceApiError::Status { status, .. } if status == 401 || status == 403 => {
                CollectionError::AuthorizationFailed { status }
            }
            ResourceApiError::Status { status, body } => CollectionError::ApiError {
                status,
                body: truncate_chars(&body, MAX_BODY_PREVIEW_CHARS),
            },
            other => CollectionError::CollectionFailed(other.to_string()),
        }
    }
}

impl From<StoreError> for CollectionError {
    fn from(e: StoreError) -> Self {
        CollectionError::CollectionFailed(e.to_string())
    }
}

/// Conditions fatal to a whole cycle (the lease is still released first).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to enumerate active tenants: {0}")]
    TenantEnumeration(#[source] StoreError),

    #[error("collection cycle panicked: {0}")]
    Panicked(String),
}
