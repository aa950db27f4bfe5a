//! Error types for the Takedown Gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Network/HTTP-level failure calling the reporting API.
///
/// Carried as its own type (rather than `reqwest::Error` directly) so that
/// pipeline stage outcomes can record it as data and test doubles can
/// construct it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport failure calling {endpoint}: {message}")]
pub struct TransportError {
    pub endpoint: String,
    pub message: String,
}

impl TransportError {
    pub fn new(endpoint: impl Into<String>, source: &reqwest::Error) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: source.to_string(),
        }
    }
}

/// Failures turning documents into or out of the reporting API's XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("document contained no root element")]
    Empty,

    #[error("unbalanced element nesting")]
    Unbalanced,

    #[error("invalid UTF-8 in document: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Failures from the wiki-edit collaborator.
///
/// A CAPTCHA challenge is *not* an error — it is a distinct
/// [`EditOutcome`](crate::wiki::EditOutcome) the caller must relay to a human.
#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    #[error("wiki transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("wiki API error: {0}")]
    Api(String),

    #[error("no edit token in response")]
    MissingToken,
}

/// Application-level errors returned by handlers.
///
/// Pipeline stage failures never surface here — they are captured in the
/// submission trace so the caller sees the full per-stage picture. Only
/// malformed input, collaborator faults on the direct endpoints, and
/// audit-store problems become handler errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid submission: {0}")]
    Validation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Wiki(#[from] WikiError),

    #[error("audit store is not configured")]
    AuditUnavailable,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            GatewayError::Transport(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            GatewayError::Xml(e) => (
                StatusCode::BAD_GATEWAY,
                format!("unusable reporting API response: {e}"),
            ),
            GatewayError::Wiki(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            GatewayError::AuditUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "audit store is not configured (set DATABASE_URL)".into(),
            ),
            GatewayError::Database(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {e}"),
            ),
            GatewayError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {e}"),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
