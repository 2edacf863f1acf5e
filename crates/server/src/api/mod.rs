// HTTP API routes
//
// All chat routes live under /api/chats. Each submodule handles one concern
// with its own AppState.

pub mod common;
pub mod conversations;
pub mod history;
pub mod messages;
pub mod stream;
pub mod validation;

use axum::Router;

// Re-export common types
pub use common::{ApiError, ErrorResponse};

use crate::config::ServerConfig;
use crate::services::Services;

/// Every chat route, unprefixed
pub fn routes(services: &Services, config: &ServerConfig) -> Router {
    Router::new()
        .merge(conversations::routes(conversations::AppState::new(
            services.conversations.clone(),
        )))
        .merge(history::routes(history::AppState::new(
            services.events.clone(),
        )))
        .merge(messages::routes(messages::AppState::new(
            services.messages.clone(),
            services.requests.clone(),
        )))
        .merge(stream::routes(stream::AppState::new(
            services.broadcaster.clone(),
            services.requests.clone(),
            config.lifecycle,
        )))
}
