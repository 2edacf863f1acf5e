// Stream frames
//
// The push channel carries server-sent events. Bot events go out as named
// `chat_event` frames, server-initiated closes as `connection_close`, and
// comments are used for the open handshake and keepalive. Encoding onto the
// wire belongs to the HTTP layer.

use serde::{Deserialize, Serialize};

use crate::event::StoredEvent;

/// Named event carrying a JSON-encoded stored event.
pub const CHAT_EVENT: &str = "chat_event";

/// Named event announcing a server-initiated close.
pub const CONNECTION_CLOSE: &str = "connection_close";

/// Comment sent as soon as the stream opens.
pub const CONNECTED: &str = "connected";

/// Comment sent while a reply is still in flight.
pub const KEEPALIVE: &str = "keepalive";

/// Why the server closed a stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Idle with nothing pending.
    Idle,
    /// Absolute idle cap reached.
    MaxIdle,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Idle => write!(f, "idle"),
            CloseReason::MaxIdle => write!(f, "max_idle"),
        }
    }
}

/// `connection_close` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionClose {
    pub reason: CloseReason,
}

/// One frame on the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Comment line, ignored by event-stream readers.
    Comment(&'static str),
    /// Named event with single-line JSON data.
    Event {
        id: Option<String>,
        name: &'static str,
        data: String,
    },
}

impl StreamFrame {
    pub fn connected() -> Self {
        StreamFrame::Comment(CONNECTED)
    }

    pub fn keepalive() -> Self {
        StreamFrame::Comment(KEEPALIVE)
    }

    /// A stored event as a `chat_event`, keyed by its event id.
    pub fn chat_event(event: &StoredEvent) -> serde_json::Result<Self> {
        Ok(StreamFrame::Event {
            id: Some(event.event_id.clone()),
            name: CHAT_EVENT,
            data: serde_json::to_string(event)?,
        })
    }

    pub fn connection_close(reason: CloseReason) -> Self {
        // Serializing a unit enum cannot fail.
        let data = serde_json::to_string(&ConnectionClose { reason })
            .unwrap_or_else(|_| format!(r#"{{"reason":"{}"}}"#, reason));
        StreamFrame::Event {
            id: None,
            name: CONNECTION_CLOSE,
            data,
        }
    }

    /// Event name, `None` for comments.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            StreamFrame::Comment(_) => None,
            StreamFrame::Event { name, .. } => Some(name),
        }
    }
}
