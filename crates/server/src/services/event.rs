// Event log service
//
// Owns append and query over the conversation log:
// - append always assigns id/createdAt (submitted ids are never kept) and
//   publishes bot events live; fixture seeding keeps the ids it is given
// - query filters out the triggering events of cancelled requests, then
//   applies the history selection

use std::sync::Arc;

use chrono::Utc;
use parley_core::ids::new_event_id;
use parley_core::{
    select, ChatEvent, ChatSummary, EventStore, HistoryQuery, HistorySlice, RequestStore,
    Result, StoredEvent,
};

use super::Broadcaster;

pub struct EventService {
    events: Arc<dyn EventStore>,
    requests: Arc<dyn RequestStore>,
    broadcaster: Broadcaster,
    after_cap: usize,
}

impl EventService {
    pub fn new(
        events: Arc<dyn EventStore>,
        requests: Arc<dyn RequestStore>,
        broadcaster: Broadcaster,
        after_cap: usize,
    ) -> Self {
        Self {
            events,
            requests,
            broadcaster,
            after_cap,
        }
    }

    /// Record an event in `conversation_id` unless it names its own.
    ///
    /// The log assigns the event id and `createdAt`; any supplied values are
    /// discarded.
    pub async fn append(&self, event: ChatEvent, conversation_id: &str) -> Result<StoredEvent> {
        self.record(event, conversation_id, false).await
    }

    /// Record a fixture event, keeping its id and `createdAt` when present.
    pub async fn seed(&self, event: ChatEvent, conversation_id: &str) -> Result<StoredEvent> {
        self.record(event, conversation_id, true).await
    }

    async fn record(
        &self,
        event: ChatEvent,
        conversation_id: &str,
        keep_identity: bool,
    ) -> Result<StoredEvent> {
        let (event_id, created_at) = if keep_identity {
            (event.event_id.clone(), event.created_at)
        } else {
            (None, None)
        };
        let event_id = event_id.unwrap_or_else(new_event_id);
        let created_at = created_at.unwrap_or_else(Utc::now);
        let conversation_id = event
            .conversation_id
            .clone()
            .unwrap_or_else(|| conversation_id.to_string());

        let stored = self
            .events
            .append_event(event.into_stored(event_id, conversation_id, created_at))
            .await?;

        tracing::debug!(
            conversation_id = %stored.conversation_id,
            event_id = %stored.event_id,
            sender = %stored.sender.kind,
            message_type = %stored.payload.message_type,
            "Event appended"
        );

        if stored.is_from_bot() {
            self.broadcaster.publish(&stored.conversation_id, &stored);
        }

        Ok(stored)
    }

    /// Query the visible history of a conversation.
    pub async fn query(&self, conversation_id: &str, query: &HistoryQuery) -> Result<HistorySlice> {
        let cancelled = self.requests.cancelled_event_ids(conversation_id).await?;
        let mut events = self.events.list_events(conversation_id).await?;
        if !cancelled.is_empty() {
            events.retain(|e| !cancelled.contains(&e.event_id));
        }
        Ok(select(&events, query, self.after_cap))
    }

    /// Full unfiltered log, as handed to the responder.
    pub async fn full_log(&self, conversation_id: &str) -> Result<Vec<StoredEvent>> {
        self.events.list_events(conversation_id).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.events.event_count().await
    }

    pub async fn conversations(&self) -> Result<Vec<ChatSummary>> {
        self.events.list_conversations().await
    }
}
