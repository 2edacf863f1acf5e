// Conversation service
//
// Single logical conversation key per server. Handles:
// - conversation id lookup (`isNew` while the log is empty)
// - demo seeding from a fixture file on the first demo request
// - chat listing

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parley_core::{ChatEvent, ChatSummary, ConversationIdResponse, Result};
use serde::Deserialize;

use super::EventService;

/// Fixture file layout: `{"messages": [...]}`
#[derive(Debug, Deserialize)]
struct DemoFlow {
    #[serde(default)]
    messages: Vec<ChatEvent>,
}

pub struct ConversationService {
    events: Arc<EventService>,
    conversation_id: String,
    demo_flow_path: PathBuf,
}

impl ConversationService {
    pub fn new(
        events: Arc<EventService>,
        conversation_id: impl Into<String>,
        demo_flow_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            events,
            conversation_id: conversation_id.into(),
            demo_flow_path: demo_flow_path.into(),
        }
    }

    /// Resolve the conversation. With `demo` on an empty log, seeds the demo
    /// fixtures and reports the conversation as not new (even when seeding
    /// failed, so the client does not send its opening context).
    pub async fn resolve(&self, demo: bool) -> Result<ConversationIdResponse> {
        let is_new = self.events.count().await? == 0;

        if is_new && demo {
            match self.seed_demo().await {
                Ok(seeded) => tracing::info!(
                    conversation_id = %self.conversation_id,
                    seeded,
                    "Demo conversation seeded"
                ),
                Err(e) => tracing::error!(
                    path = %self.demo_flow_path.display(),
                    error = %e,
                    "Demo seeding failed"
                ),
            }
            return Ok(ConversationIdResponse {
                conversation_id: self.conversation_id.clone(),
                is_new: false,
            });
        }

        Ok(ConversationIdResponse {
            conversation_id: self.conversation_id.clone(),
            is_new,
        })
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        self.events.conversations().await
    }

    async fn seed_demo(&self) -> Result<usize> {
        let messages = load_demo_flow(&self.demo_flow_path).await?;
        let count = messages.len();
        for message in messages {
            // Fixtures always land in this server's conversation.
            let message = message.in_conversation(self.conversation_id.clone());
            self.events.seed(message, &self.conversation_id).await?;
        }
        Ok(count)
    }
}

async fn load_demo_flow(path: &Path) -> Result<Vec<ChatEvent>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read demo flow {}", path.display()))?;
    let flow: DemoFlow = serde_json::from_str(&raw)?;
    Ok(flow.messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Broadcaster;
    use crate::storage::Storage;
    use parley_core::history::DEFAULT_AFTER_CAP;
    use parley_core::HistoryQuery;

    fn events() -> Arc<EventService> {
        let storage = Storage::in_memory();
        Arc::new(EventService::new(
            storage.events,
            storage.requests,
            Broadcaster::new(),
            DEFAULT_AFTER_CAP,
        ))
    }

    fn fixture_file(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "parley-{}-{}.json",
            name,
            parley_core::ids::new_event_id()
        ));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_new_until_first_event() {
        let events = events();
        let service = ConversationService::new(events.clone(), "conv_1", "missing.json");

        let first = service.resolve(false).await.unwrap();
        assert_eq!(first.conversation_id, "conv_1");
        assert!(first.is_new);

        events
            .append(ChatEvent::user_text("conv_1", "hi"), "conv_1")
            .await
            .unwrap();
        assert!(!service.resolve(false).await.unwrap().is_new);
    }

    #[tokio::test]
    async fn test_demo_seeds_fixture_once() {
        let path = fixture_file(
            "demo",
            r#"{"messages":[
                {"eventId":"evt_demo_1","eventType":"message","sender":{"type":"user"},
                 "payload":{"messageType":"text","content":{"text":"hi"}},
                 "createdAt":"2024-01-01T00:00:00Z"},
                {"eventId":"evt_demo_2","conversationId":"elsewhere","eventType":"message",
                 "sender":{"type":"bot","id":"re_bot"},
                 "payload":{"messageType":"markdown","content":{"text":"Hey!"}},
                 "createdAt":"2024-01-01T00:00:01Z"}
            ]}"#,
        );
        let events = events();
        let service = ConversationService::new(events.clone(), "conv_1", &path);

        let response = service.resolve(true).await.unwrap();
        assert!(!response.is_new);

        let history = events.query("conv_1", &HistoryQuery::All).await.unwrap();
        let ids: Vec<_> = history.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["evt_demo_1", "evt_demo_2"]);

        // Not new any more: no second seeding.
        service.resolve(true).await.unwrap();
        assert_eq!(events.count().await.unwrap(), 2);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_demo_with_missing_fixture_still_reports_not_new() {
        let service = ConversationService::new(events(), "conv_1", "/nonexistent/demo-flow.json");
        let response = service.resolve(true).await.unwrap();
        assert!(!response.is_new);
    }

    #[tokio::test]
    async fn test_list_chats() {
        let events = events();
        let service = ConversationService::new(events.clone(), "conv_1", "missing.json");
        assert!(service.list_chats().await.unwrap().is_empty());

        events
            .append(ChatEvent::user_text("conv_1", "hi"), "conv_1")
            .await
            .unwrap();
        let chats = service.list_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].conversation_id, "conv_1");
    }
}
