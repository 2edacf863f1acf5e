// Conversation HTTP routes
//
// Conversation id lookup (with optional demo seeding) and chat listing.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use parley_core::{ChatsResponse, ConversationIdQuery, ConversationIdResponse};

use super::common::{ApiError, ErrorResponse};
use crate::services::ConversationService;

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<ConversationService>,
}

impl AppState {
    pub fn new(conversation_service: Arc<ConversationService>) -> Self {
        Self {
            conversation_service,
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chats/get-conversation-id", get(get_conversation_id))
        .route("/api/chats/get-chats", get(get_chats))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// GET /api/chats/get-conversation-id - Resolve the conversation
#[utoipa::path(
    get,
    path = "/api/chats/get-conversation-id",
    params(ConversationIdQuery),
    responses(
        (status = 200, description = "Conversation id", body = ConversationIdResponse),
        (status = 400, description = "Invalid query", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "conversations"
)]
pub async fn get_conversation_id(
    State(state): State<AppState>,
    query: Result<Query<ConversationIdQuery>, QueryRejection>,
) -> Result<Json<ConversationIdResponse>, ApiError> {
    let Query(query) = query?;
    let response = state
        .conversation_service
        .resolve(query.demo.unwrap_or(false))
        .await?;
    Ok(Json(response))
}

/// GET /api/chats/get-chats - List conversations
#[utoipa::path(
    get,
    path = "/api/chats/get-chats",
    responses(
        (status = 200, description = "Known conversations", body = ChatsResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "conversations"
)]
pub async fn get_chats(State(state): State<AppState>) -> Result<Json<ChatsResponse>, ApiError> {
    let chats = state.conversation_service.list_chats().await?;
    Ok(Json(ChatsResponse { chats }))
}
