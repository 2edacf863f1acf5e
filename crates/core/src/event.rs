// Chat event domain types
//
// A chat event is one immutable message, action or system notice in a
// conversation's ordered log. `ChatEvent` is the submitted form (id and
// timestamp optional); `StoredEvent` is what the log hands back once the id
// and `createdAt` have been assigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Top-level event kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Conversational message.
    Message,
    /// Informational / system notice.
    Info,
}

/// Who produced an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Bot,
    System,
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderType::User => write!(f, "user"),
            SenderType::Bot => write!(f, "bot"),
            SenderType::System => write!(f, "system"),
        }
    }
}

/// Payload message type. Determines how `content` is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Context,
    Text,
    Template,
    UserAction,
    Markdown,
    Html,
    Analytics,
}

impl MessageType {
    /// Context and analytics events never get a reply.
    pub fn expects_response(self) -> bool {
        !matches!(self, MessageType::Context | MessageType::Analytics)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Context => "context",
            MessageType::Text => "text",
            MessageType::Template => "template",
            MessageType::UserAction => "user_action",
            MessageType::Markdown => "markdown",
            MessageType::Html => "html",
            MessageType::Analytics => "analytics",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Shown,
    Hidden,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReplyType {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    Message,
    TemplateItem,
}

/// Event author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Sender {
    #[serde(rename = "type")]
    pub kind: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Sender {
    pub fn user() -> Self {
        Self {
            kind: SenderType::User,
            id: None,
        }
    }

    pub fn system() -> Self {
        Self {
            kind: SenderType::System,
            id: None,
        }
    }

    pub fn bot(id: impl Into<String>) -> Self {
        Self {
            kind: SenderType::Bot,
            id: Some(id.into()),
        }
    }
}

/// Action a user can take on a message or template item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChatAction {
    pub id: String,
    pub label: String,
    pub reply_type: ReplyType,
    pub scope: ActionScope,
}

/// Event payload. `content` is free-form; its shape depends on `message_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ChatAction>>,
}

impl Payload {
    pub fn new(message_type: MessageType, content: Value) -> Self {
        Self {
            message_id: None,
            message_type,
            visibility: None,
            content,
            actions: None,
        }
    }

    /// `content.text`, if present.
    pub fn text(&self) -> Option<&str> {
        self.content.get("text").and_then(Value::as_str)
    }

    /// `content.data`, if present and an object.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.content.get("data").and_then(Value::as_object)
    }
}

/// A submitted event. The log assigns `event_id` and `created_at`; values
/// carried here are only kept for fixtures and round-trips of stored events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_auth_token: Option<String>,
    pub sender: Sender,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatEvent {
    pub fn new(event_type: EventType, sender: Sender, payload: Payload) -> Self {
        Self {
            event_id: None,
            conversation_id: None,
            event_type,
            login_auth_token: None,
            sender,
            payload,
            metadata: None,
            created_at: None,
        }
    }

    /// Plain user text message.
    pub fn user_text(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            EventType::Message,
            Sender::user(),
            Payload::new(MessageType::Text, serde_json::json!({ "text": text.into() })),
        )
        .in_conversation(conversation_id)
    }

    /// Context event sent when a conversation is opened for the first time.
    pub fn context(conversation_id: impl Into<String>, data: Value) -> Self {
        Self::new(
            EventType::Info,
            Sender::system(),
            Payload::new(MessageType::Context, serde_json::json!({ "data": data })),
        )
        .in_conversation(conversation_id)
    }

    /// Analytics event (never expects a reply).
    pub fn analytics(conversation_id: impl Into<String>, data: Value) -> Self {
        Self::new(
            EventType::Info,
            Sender::system(),
            Payload::new(MessageType::Analytics, serde_json::json!({ "data": data })),
        )
        .in_conversation(conversation_id)
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn expects_response(&self) -> bool {
        self.payload.message_type.expects_response()
    }

    /// Convert to the stored form with the given identity.
    pub fn into_stored(
        self,
        event_id: String,
        conversation_id: String,
        created_at: DateTime<Utc>,
    ) -> StoredEvent {
        StoredEvent {
            event_id,
            conversation_id,
            event_type: self.event_type,
            login_auth_token: self.login_auth_token,
            sender: self.sender,
            payload: self.payload,
            metadata: self.metadata,
            created_at,
        }
    }
}

/// An event as recorded in the log. Never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub event_id: String,
    pub conversation_id: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_auth_token: Option<String>,
    pub sender: Sender,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn is_from_bot(&self) -> bool {
        self.sender.kind == SenderType::Bot
    }

    /// Back to the submitted form (used when handing history to a responder).
    pub fn to_event(&self) -> ChatEvent {
        ChatEvent {
            event_id: Some(self.event_id.clone()),
            conversation_id: Some(self.conversation_id.clone()),
            event_type: self.event_type,
            login_auth_token: self.login_auth_token.clone(),
            sender: self.sender.clone(),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            created_at: Some(self.created_at),
        }
    }
}
