// History HTTP routes

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use parley_core::{HistoryParams, HistoryResponse};

use super::common::{required, ApiError, ErrorResponse};
use crate::services::EventService;

#[derive(Clone)]
pub struct AppState {
    pub event_service: Arc<EventService>,
}

impl AppState {
    pub fn new(event_service: Arc<EventService>) -> Self {
        Self { event_service }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chats/get-history", get(get_history))
        .with_state(state)
}

/// GET /api/chats/get-history - Query conversation history
///
/// Modes (first match wins): `last`, `messages_before` (+`page_size`),
/// `messages_after`, `page`+`page_size`; otherwise everything.
#[utoipa::path(
    get,
    path = "/api/chats/get-history",
    params(HistoryParams),
    responses(
        (status = 200, description = "History slice", body = HistoryResponse),
        (status = 400, description = "Missing conversationId or invalid query", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "history"
)]
pub async fn get_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(params) = params?;
    let conversation_id = required(params.conversation_id.clone(), "conversationId")?;
    let query = params.to_query();

    let slice = state.event_service.query(&conversation_id, &query).await?;
    tracing::debug!(
        conversation_id = %conversation_id,
        query = ?query,
        returned = slice.events.len(),
        has_more = slice.has_more,
        "History query"
    );

    Ok(Json(HistoryResponse {
        conversation_id,
        messages: slice.events,
        has_more: slice.has_more,
    }))
}
