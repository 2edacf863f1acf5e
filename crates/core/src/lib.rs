// Parley Core
//
// Storage-agnostic building blocks of the chat request/delivery lifecycle,
// shared by the server and the reconciling client.
//
// Key design decisions:
// - Wire types use the camelCase JSON contract of the chat API
// - Ids are strings (UUID v7 with a type prefix when generated here)
// - History selection is a pure function over an already-filtered event list
// - Stores, responder and push transport are traits so backends stay pluggable

pub mod error;
pub mod event;
pub mod history;
pub mod ids;
pub mod protocol;
pub mod request;
pub mod sse;
pub mod telemetry;
pub mod traits;

// Re-exports for convenience
pub use error::{ChatError, Result};
pub use event::{
    ActionScope, ChatAction, ChatEvent, EventType, MessageType, Payload, ReplyType, Sender,
    SenderType, StoredEvent, Visibility,
};
pub use history::{select, HistoryParams, HistoryQuery, HistorySlice, DEFAULT_PAGE_SIZE};
pub use protocol::{
    CancelRequest, ChatSummary, ChatsResponse, ConversationIdQuery, ConversationIdResponse,
    HistoryResponse, OkResponse, SendMessageRequest, SendMessageResponse, StreamQuery,
};
pub use request::{ChatRequest, RequestState};
pub use sse::{CloseReason, ConnectionClose, StreamFrame};
pub use traits::{EventStore, FrameSink, RequestStore, Responder, SilentResponder, SinkClosed};
