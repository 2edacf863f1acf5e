// OpenAPI specification generation
//
// Served by the API server at /api-doc/openapi.json and printed by the
// export-openapi binary.

use parley_core::{
    ActionScope, CancelRequest, ChatAction, ChatEvent, ChatSummary, ChatsResponse,
    ConversationIdResponse, EventType, HistoryResponse, MessageType, OkResponse, Payload,
    ReplyType, SendMessageRequest, SendMessageResponse, Sender, SenderType, StoredEvent,
    Visibility,
};
use utoipa::OpenApi;

use crate::api;
use crate::api::ErrorResponse;

/// OpenAPI documentation for the Parley chat API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::conversations::get_conversation_id,
        api::conversations::get_chats,
        api::history::get_history,
        api::messages::send_message,
        api::messages::cancel,
        api::stream::stream,
    ),
    components(
        schemas(
            ChatEvent, StoredEvent, Sender, SenderType, EventType,
            Payload, MessageType, Visibility, ChatAction, ReplyType, ActionScope,
            ConversationIdResponse, HistoryResponse,
            SendMessageRequest, SendMessageResponse,
            CancelRequest, OkResponse,
            ChatSummary, ChatsResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "conversations", description = "Conversation lookup and listing"),
        (name = "history", description = "Conversation history queries"),
        (name = "messages", description = "Event submission and cancellation"),
        (name = "stream", description = "Live bot events (SSE)")
    ),
    info(
        title = "Parley API",
        version = "0.1.0",
        description = "Asynchronous chat: submit events, stream and catch up on bot replies",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}
