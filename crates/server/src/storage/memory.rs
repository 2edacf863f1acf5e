// In-memory storage implementation
// Decision: Use parking_lot for thread-safe access
// Decision: Events kept per conversation in append order (append order is the total order)
//
// All data is stored in memory and lost on restart.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use parley_core::{
    ChatRequest, ChatSummary, EventStore, RequestState, RequestStore, Result, StoredEvent,
};

/// In-memory database for the event log and request tracker
#[derive(Default)]
pub struct InMemoryDatabase {
    events: RwLock<HashMap<String, Vec<StoredEvent>>>,
    requests: RwLock<HashMap<String, ChatRequest>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryDatabase {
    async fn append_event(&self, event: StoredEvent) -> Result<StoredEvent> {
        self.events
            .write()
            .entry(event.conversation_id.clone())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, conversation_id: &str) -> Result<Vec<StoredEvent>> {
        Ok(self
            .events
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn event_count(&self) -> Result<usize> {
        Ok(self.events.read().values().map(Vec::len).sum())
    }

    async fn list_conversations(&self) -> Result<Vec<ChatSummary>> {
        let events = self.events.read();
        let mut result: Vec<_> = events
            .iter()
            .filter_map(|(conversation_id, log)| {
                let first = log.first()?;
                let last = log.last()?;
                Some(ChatSummary {
                    conversation_id: conversation_id.clone(),
                    created_at: first.created_at,
                    last_activity_at: last.created_at,
                })
            })
            .collect();
        result.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(result)
    }
}

#[async_trait]
impl RequestStore for InMemoryDatabase {
    async fn insert_request(&self, request: ChatRequest) -> Result<ChatRequest> {
        self.requests
            .write()
            .insert(request.request_id.clone(), request.clone());
        Ok(request)
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<ChatRequest>> {
        Ok(self.requests.read().get(request_id).cloned())
    }

    async fn transition_request(
        &self,
        request_id: &str,
        to: RequestState,
    ) -> Result<Option<ChatRequest>> {
        let mut requests = self.requests.write();
        let Some(request) = requests.get_mut(request_id) else {
            return Ok(None);
        };
        if request.transition(to, Utc::now()) {
            Ok(Some(request.clone()))
        } else {
            Ok(None)
        }
    }

    async fn has_pending(&self, conversation_id: &str) -> Result<bool> {
        Ok(self
            .requests
            .read()
            .values()
            .any(|r| r.conversation_id == conversation_id && r.is_pending()))
    }

    async fn cancelled_event_ids(&self, conversation_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .requests
            .read()
            .values()
            .filter(|r| {
                r.conversation_id == conversation_id && r.state == RequestState::CancelledByUser
            })
            .map(|r| r.user_event_id.clone())
            .collect())
    }
}
