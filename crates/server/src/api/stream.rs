// Event streaming HTTP route (SSE)
// Decision: The SSE body is fed by a channel the session writes into, so the
// session owns keepalive and close notifications (no axum KeepAlive)

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use parley_core::StreamQuery;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::common::{required, ApiError, ErrorResponse};
use crate::services::{Broadcaster, RequestService};
use crate::stream::{ChannelSink, StreamLifecycle, StreamSession};

/// Frames buffered per connection before a slow client counts as broken
const STREAM_BUFFER: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Broadcaster,
    pub request_service: Arc<RequestService>,
    pub lifecycle: StreamLifecycle,
}

impl AppState {
    pub fn new(
        broadcaster: Broadcaster,
        request_service: Arc<RequestService>,
        lifecycle: StreamLifecycle,
    ) -> Self {
        Self {
            broadcaster,
            request_service,
            lifecycle,
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chats/stream", get(stream))
        .with_state(state)
}

/// GET /api/chats/stream - Live bot events (SSE)
///
/// Named events: `chat_event` (a stored event), `connection_close`
/// (`{"reason": ...}`). Comment lines mark the handshake and keepalives.
#[utoipa::path(
    get,
    path = "/api/chats/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Missing conversationId", body = ErrorResponse)
    ),
    tag = "stream"
)]
pub async fn stream(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let conversation_id = required(query.conversation_id, "conversationId")?;

    let (tx, rx) = mpsc::channel::<SseEvent>(STREAM_BUFFER);
    let sink = ChannelSink::new(tx);
    let disconnected = sink.closed();
    let session = StreamSession::new(
        conversation_id,
        Arc::new(sink),
        state.lifecycle,
        state.request_service.clone(),
    );
    let broadcaster = state.broadcaster.clone();
    tokio::spawn(async move {
        session.run(&broadcaster, disconnected).await;
    });

    let events = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(([("x-accel-buffering", "no")], Sse::new(events)))
}
