// Core traits
//
// Seams between the request/delivery lifecycle and its collaborators:
// - EventStore / RequestStore: pluggable persistence for the log and tracker
// - Responder: asynchronous reply generation (mocked in the server)
// - FrameSink: the push transport, reduced to "accepts frames, reports closed"

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::event::{ChatEvent, StoredEvent};
use crate::protocol::ChatSummary;
use crate::request::{ChatRequest, RequestState};
use crate::sse::StreamFrame;

/// Append-only event storage, partitioned by conversation.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a fully identified event. Returns it unchanged.
    async fn append_event(&self, event: StoredEvent) -> Result<StoredEvent>;

    /// All events of a conversation in append order.
    async fn list_events(&self, conversation_id: &str) -> Result<Vec<StoredEvent>>;

    /// Number of events across all conversations.
    async fn event_count(&self) -> Result<usize>;

    /// One summary per conversation that has at least one event.
    async fn list_conversations(&self) -> Result<Vec<ChatSummary>>;
}

/// Request record storage.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(&self, request: ChatRequest) -> Result<ChatRequest>;

    async fn get_request(&self, request_id: &str) -> Result<Option<ChatRequest>>;

    /// Move a request out of PENDING. Returns the updated record if it
    /// transitioned, `None` for unknown or already-terminal requests.
    async fn transition_request(
        &self,
        request_id: &str,
        to: RequestState,
    ) -> Result<Option<ChatRequest>>;

    async fn has_pending(&self, conversation_id: &str) -> Result<bool>;

    /// Triggering event ids of cancelled requests in a conversation.
    async fn cancelled_event_ids(&self, conversation_id: &str) -> Result<HashSet<String>>;
}

/// Produces reply events for a submitted event.
///
/// Implementations may take arbitrarily long; callers never block on them.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Given the latest event and the conversation's history (which already
    /// contains it), return zero or more bot events to append, in order.
    async fn respond(&self, latest: &ChatEvent, history: &[StoredEvent])
        -> Result<Vec<ChatEvent>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str {
        "Responder"
    }
}

/// The transport is gone; nothing more can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sink closed")]
pub struct SinkClosed;

/// A push transport that accepts stream frames.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: &StreamFrame) -> std::result::Result<(), SinkClosed>;
}

/// No-op responder that never replies.
#[derive(Debug, Clone, Default)]
pub struct SilentResponder;

#[async_trait]
impl Responder for SilentResponder {
    async fn respond(
        &self,
        _latest: &ChatEvent,
        _history: &[StoredEvent],
    ) -> Result<Vec<ChatEvent>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "SilentResponder"
    }
}
