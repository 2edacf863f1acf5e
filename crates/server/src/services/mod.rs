// Services layer for business logic
// Services own validation and lifecycle rules, calling storage through the core traits

pub mod broadcast;
pub mod conversation;
pub mod event;
pub mod message;
pub mod request;

use std::sync::Arc;

use parley_core::Responder;

pub use broadcast::{Broadcaster, Subscription};
pub use conversation::ConversationService;
pub use event::EventService;
pub use message::MessageService;
pub use request::RequestService;

use crate::config::ServerConfig;
use crate::storage::Storage;

/// Every service, wired once at startup and shared by the API layer
#[derive(Clone)]
pub struct Services {
    pub broadcaster: Broadcaster,
    pub events: Arc<EventService>,
    pub requests: Arc<RequestService>,
    pub messages: Arc<MessageService>,
    pub conversations: Arc<ConversationService>,
}

impl Services {
    pub fn new(storage: Storage, responder: Arc<dyn Responder>, config: &ServerConfig) -> Self {
        let broadcaster = Broadcaster::new();
        let events = Arc::new(EventService::new(
            storage.events.clone(),
            storage.requests.clone(),
            broadcaster.clone(),
            config.history_after_cap,
        ));
        let requests = Arc::new(RequestService::new(storage.requests));
        let messages = Arc::new(MessageService::new(
            events.clone(),
            requests.clone(),
            responder,
            config.responder.clone(),
            config.conversation_id.clone(),
        ));
        let conversations = Arc::new(ConversationService::new(
            events.clone(),
            config.conversation_id.clone(),
            config.demo_flow_path.clone(),
        ));

        Self {
            broadcaster,
            events,
            requests,
            messages,
            conversations,
        }
    }
}
