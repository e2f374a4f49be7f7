//! Error types for certificate generation, persistence and the HTTP layer.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::email::DistributionError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("store operation `{operation}` timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("stored data is invalid: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure to compose a certificate document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("embedded code image is invalid: {0}")]
    InvalidImage(String),

    #[error("pdf composition failed: {0}")]
    Pdf(String),
}

/// Failure of one participant's pipeline. Never aborts a batch.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Phase-fatal batch failure. Halts every later phase.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("event {0} not found")]
    EventNotFound(Uuid),

    #[error("no participants found for event {0}; upload participants first")]
    NoParticipants(Uuid),

    #[error("failed to fetch participants: {0}")]
    Fetch(#[source] StoreError),

    #[error("no certificates produced: all {attempted} participants failed")]
    NothingProduced { attempted: usize },

    #[error("failed to save certificates: {0}")]
    Persist(#[source] StoreError),

    #[error("failed to package certificates: {0}")]
    Package(#[from] zip::result::ZipError),
}

/// Application-level error type for HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Batch(err) => match err {
                BatchError::EventNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                BatchError::NoParticipants(_) | BatchError::NothingProduced { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "NOTHING_TO_GENERATE",
                    err.to_string(),
                ),
                BatchError::Fetch(store) | BatchError::Persist(store) => {
                    tracing::error!(error = %store, "Batch store failure");
                    classify_store_error(store, err.to_string())
                }
                BatchError::Package(zip_err) => {
                    tracing::error!(error = %zip_err, "Archive packaging failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
            AppError::Store(StoreError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string())
            }
            AppError::Store(store) => {
                tracing::error!(error = %store, "Store error");
                classify_store_error(store, "An internal error occurred".to_string())
            }
            AppError::Distribution(err) => match err {
                DistributionError::NoRecipients => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "NO_RECIPIENTS",
                    "No certificates to distribute; generate certificates first".to_string(),
                ),
                DistributionError::NotConfigured => {
                    (StatusCode::CONFLICT, "EMAIL_NOT_CONFIGURED", err.to_string())
                }
                DistributionError::Send(send) => {
                    tracing::warn!(error = %send, "Email send failed");
                    (StatusCode::BAD_GATEWAY, "EMAIL_SEND_FAILED", err.to_string())
                }
                _ => {
                    tracing::error!(error = %err, "Email distribution failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Timeouts are retryable and surface as 503; everything else is a 500.
fn classify_store_error(err: &StoreError, message: String) -> (StatusCode, &'static str, String) {
    if err.is_timeout() {
        (StatusCode::SERVICE_UNAVAILABLE, "STORE_TIMEOUT", message)
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", message)
    }
}
