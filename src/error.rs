//! The relay's error taxonomy. `QueueManager` and `Store`
//! return [`RelayError`]; the HTTP gateway is the only place a kind becomes
//! a status code, via the [`actix_web::ResponseError`] impl below.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The queue (or its message list) is absent or expired.
    #[error("queue not found")]
    NotFound,

    /// The supplied token does not authorize the requested queue.
    #[error("unauthorized")]
    Unauthorized,

    /// Payload exceeds `MAX_MSG_BYTES`.
    #[error("payload too large")]
    PayloadTooLarge,

    /// Queue depth has reached `MAX_QUEUE_DEPTH`.
    #[error("queue full")]
    QueueFull,

    /// Unparseable JSON or a missing required field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Any Store-level fault. Internal details are logged, never returned.
    #[error("storage failure")]
    StorageFailure,

    /// The per-request deadline fired before completion.
    #[error("timeout")]
    Timeout,
}

impl RelayError {
    fn kind(&self) -> &'static str {
        match self {
            RelayError::NotFound => "not-found",
            RelayError::Unauthorized => "unauthorized",
            RelayError::PayloadTooLarge => "payload-too-large",
            RelayError::QueueFull => "queue-full",
            RelayError::BadRequest(_) => "bad-request",
            RelayError::StorageFailure => "storage-failure",
            RelayError::Timeout => "timeout",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Storage failures must not leak internals to the client.
        let message = match self {
            RelayError::StorageFailure => "internal storage error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message,
        })
    }
}

impl From<redis::RedisError> for RelayError {
    fn from(e: redis::RedisError) -> Self {
        tracing::warn!(error = %e, "redis operation failed");
        RelayError::StorageFailure
    }
}

/// Enforce the per-request deadline (`request_timeout_secs`)
/// around a single handler's store-touching work.
pub async fn with_timeout<T>(
    timeout: std::time::Duration,
    fut: impl std::future::Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(RelayError::Timeout))
}
