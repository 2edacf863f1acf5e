// Chat transport
//
// The engine talks to the server only through `ChatTransport`, so the
// reconciliation logic can be driven by a scripted fake in tests.

use async_trait::async_trait;
use parley_core::{
    CancelRequest, ChatEvent, ChatsResponse, ConversationIdQuery, ConversationIdResponse,
    HistoryParams, HistoryResponse, OkResponse, SendMessageRequest, SendMessageResponse,
    StreamQuery,
};

use crate::client::{Client, ClientError};
use crate::stream::{signals, SignalStream};

const CHATS_PATH: &str = "/api/chats";
const NO_QUERY: [(&str, &str); 0] = [];

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Resolve the conversation to open. `demo` asks the server to seed fixtures.
    async fn conversation_id(&self, demo: bool) -> Result<ConversationIdResponse, ClientError>;

    async fn history(&self, params: &HistoryParams) -> Result<HistoryResponse, ClientError>;

    async fn send_message(&self, event: &ChatEvent) -> Result<SendMessageResponse, ClientError>;

    async fn cancel(&self, request_id: &str) -> Result<(), ClientError>;

    /// Subscribe to pushed bot events. Returning `Ok` means the stream is open.
    async fn open_stream(&self, conversation_id: &str) -> Result<SignalStream, ClientError>;
}

/// `ChatTransport` over the HTTP API.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn path(endpoint: &str) -> String {
        format!("{}/{}", CHATS_PATH, endpoint)
    }

    pub async fn chats(&self) -> Result<ChatsResponse, ClientError> {
        self.client.get(&Self::path("get-chats"), &NO_QUERY).await
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn conversation_id(&self, demo: bool) -> Result<ConversationIdResponse, ClientError> {
        let query = ConversationIdQuery {
            demo: demo.then_some(true),
        };
        self.client
            .get(&Self::path("get-conversation-id"), &query)
            .await
    }

    async fn history(&self, params: &HistoryParams) -> Result<HistoryResponse, ClientError> {
        self.client.get(&Self::path("get-history"), params).await
    }

    async fn send_message(&self, event: &ChatEvent) -> Result<SendMessageResponse, ClientError> {
        let body = SendMessageRequest {
            event: event.clone(),
        };
        self.client.post(&Self::path("send-message"), &body).await
    }

    async fn cancel(&self, request_id: &str) -> Result<(), ClientError> {
        let body = CancelRequest {
            request_id: request_id.to_string(),
        };
        let _: OkResponse = self.client.post(&Self::path("cancel"), &body).await?;
        Ok(())
    }

    async fn open_stream(&self, conversation_id: &str) -> Result<SignalStream, ClientError> {
        let query = StreamQuery {
            conversation_id: Some(conversation_id.to_string()),
        };
        let response = self
            .client
            .get_stream(&Self::path("stream"), &query)
            .await?;
        Ok(signals(response.bytes_stream()))
    }
}
