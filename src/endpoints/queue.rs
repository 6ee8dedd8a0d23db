//! The `/queue/*` REST surface.

use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RuntimeSettings;
use crate::domain::manager::QueueManager;
use crate::error::{with_timeout, RelayError};

/// Extract the bearer token: case-insensitive `Bearer ` prefix, or the
/// raw header value if the prefix is absent.
pub fn extract_bearer(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let trimmed = header.trim();
    if trimmed.len() > 7 && trimmed[..7].eq_ignore_ascii_case("bearer ") {
        Some(trimmed[7..].trim().to_string())
    } else {
        Some(trimmed.to_string())
    }
}

fn bearer_or_unauthorized(req: &HttpRequest) -> Result<String, RelayError> {
    extract_bearer(req).filter(|t| !t.is_empty()).ok_or(RelayError::Unauthorized)
}

#[derive(Serialize)]
struct CreateQueueResponse {
    queue_id: String,
    access_token: String,
    queue_url: String,
    expires_at: DateTime<Utc>,
}

#[tracing::instrument(name = "Create queue", skip(manager, runtime))]
pub async fn create_queue(
    manager: web::Data<Arc<QueueManager>>,
    runtime: web::Data<RuntimeSettings>,
) -> Result<HttpResponse, RelayError> {
    let timeout = std::time::Duration::from_secs(runtime.request_timeout_secs);
    let created = with_timeout(timeout, manager.create_queue()).await?;
    let queue_url = format!("/queue/{}", created.handle);
    Ok(HttpResponse::Created().json(CreateQueueResponse {
        queue_id: created.handle,
        access_token: created.token,
        queue_url,
        expires_at: created.expires_at,
    }))
}

#[derive(Deserialize)]
struct SendRequest {
    #[serde(with = "crate::endpoints::payload")]
    payload: Vec<u8>,
}

#[derive(Serialize)]
struct SendResponse {
    message_id: String,
    sent_at: DateTime<Utc>,
}

#[tracing::instrument(name = "Send message", skip(manager, runtime, body), fields(handle = %handle))]
pub async fn send_message(
    manager: web::Data<Arc<QueueManager>>,
    runtime: web::Data<RuntimeSettings>,
    handle: web::Path<String>,
    body: web::Json<SendRequest>,
) -> Result<HttpResponse, RelayError> {
    let timeout = std::time::Duration::from_secs(runtime.request_timeout_secs);
    let appended = with_timeout(timeout, manager.append(&handle, body.into_inner().payload)).await?;
    Ok(HttpResponse::Created().json(SendResponse {
        message_id: appended.message_id,
        sent_at: appended.received_at,
    }))
}

#[derive(Deserialize)]
pub struct ReceiveQuery {
    since: Option<String>,
    limit: Option<u64>,
}

#[derive(Serialize)]
struct MessageOut {
    id: String,
    queue_id: String,
    #[serde(with = "crate::endpoints::payload")]
    payload: Vec<u8>,
    received_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ReceiveResponse {
    messages: Vec<MessageOut>,
    has_more: bool,
}

#[tracing::instrument(name = "Receive messages", skip(manager, runtime, req), fields(handle = %handle))]
pub async fn receive_messages(
    req: HttpRequest,
    manager: web::Data<Arc<QueueManager>>,
    runtime: web::Data<RuntimeSettings>,
    handle: web::Path<String>,
    query: web::Query<ReceiveQuery>,
) -> Result<HttpResponse, RelayError> {
    let token = bearer_or_unauthorized(&req)?;
    let timeout = std::time::Duration::from_secs(runtime.request_timeout_secs);
    let window = with_timeout(
        timeout,
        manager.window(&handle, &token, query.since.as_deref(), query.limit),
    )
    .await?;
    Ok(HttpResponse::Ok().json(ReceiveResponse {
        messages: window
            .messages
            .into_iter()
            .map(|m| MessageOut {
                id: m.id,
                queue_id: m.queue_handle,
                payload: m.payload,
                received_at: m.received_at,
            })
            .collect(),
        has_more: window.has_more,
    }))
}

#[tracing::instrument(name = "Delete queue", skip(manager, runtime, req), fields(handle = %handle))]
pub async fn delete_queue(
    req: HttpRequest,
    manager: web::Data<Arc<QueueManager>>,
    runtime: web::Data<RuntimeSettings>,
    handle: web::Path<String>,
) -> Result<HttpResponse, RelayError> {
    let token = bearer_or_unauthorized(&req)?;
    let timeout = std::time::Duration::from_secs(runtime.request_timeout_secs);
    with_timeout(timeout, manager.delete_queue(&handle, &token)).await?;
    Ok(HttpResponse::NoContent().finish())
}
