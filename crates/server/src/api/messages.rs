// Message HTTP routes
//
// Submission returns 202 as soon as the event and its request are recorded;
// replies arrive later over the stream (or via history catch-up).

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parley_core::{CancelRequest, OkResponse, SendMessageRequest, SendMessageResponse};
use serde_json::Value;

use super::common::{ApiError, ErrorResponse};
use super::validation::{validate_cancel, validate_send_message};
use crate::services::{MessageService, RequestService};

#[derive(Clone)]
pub struct AppState {
    pub message_service: Arc<MessageService>,
    pub request_service: Arc<RequestService>,
}

impl AppState {
    pub fn new(message_service: Arc<MessageService>, request_service: Arc<RequestService>) -> Self {
        Self {
            message_service,
            request_service,
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chats/send-message", post(send_message))
        .route("/api/chats/cancel", post(cancel))
        .with_state(state)
}

/// POST /api/chats/send-message - Submit an event
#[utoipa::path(
    post,
    path = "/api/chats/send-message",
    request_body = SendMessageRequest,
    responses(
        (status = 202, description = "Event recorded, reply pending", body = SendMessageResponse),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "messages"
)]
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let Json(body) = body?;
    let event = validate_send_message(&body)?;
    let response = state.message_service.submit(event).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /api/chats/cancel - Cancel a pending request
///
/// Always `{ok: true}` for a well-formed body; unknown or finished requests
/// are left untouched.
#[utoipa::path(
    post,
    path = "/api/chats/cancel",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Cancel accepted", body = OkResponse),
        (status = 400, description = "Missing requestId", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "messages"
)]
pub async fn cancel(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(body) = body?;
    let request_id = validate_cancel(&body)?;
    state.request_service.cancel(&request_id).await?;
    Ok(Json(OkResponse::ok()))
}
