// Push channel reader
//
// Turns the raw `text/event-stream` body into the handful of signals the
// engine cares about. Comment frames (handshake, keepalive) carry no data and
// are dropped; frames that fail to decode are skipped.

use std::fmt::Display;
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{future, Stream, StreamExt};
use parley_core::sse::{CHAT_EVENT, CONNECTION_CLOSE};
use parley_core::{CloseReason, ConnectionClose, StoredEvent};

/// What the push channel told us.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// A bot event was published to the conversation.
    Event(StoredEvent),
    /// The server closed the stream on purpose.
    Close(CloseReason),
    /// The transport failed; the stream is unusable.
    Error(String),
}

pub type SignalStream = Pin<Box<dyn Stream<Item = StreamSignal> + Send>>;

/// Decode an event-stream byte body into signals.
pub fn signals<S, B, E>(body: S) -> SignalStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoded = body.eventsource().filter_map(|frame| {
        let signal = match frame {
            Ok(event) => match event.event.as_str() {
                CHAT_EVENT => match serde_json::from_str::<StoredEvent>(&event.data) {
                    Ok(stored) => Some(StreamSignal::Event(stored)),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping undecodable chat_event");
                        None
                    }
                },
                CONNECTION_CLOSE => {
                    let reason = serde_json::from_str::<ConnectionClose>(&event.data)
                        .map(|c| c.reason)
                        .unwrap_or(CloseReason::Idle);
                    Some(StreamSignal::Close(reason))
                }
                _ => None,
            },
            Err(e) => Some(StreamSignal::Error(e.to_string())),
        };
        future::ready(signal)
    });
    Box::pin(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_core::{ChatEvent, EventType, MessageType, Payload, Sender, StreamFrame};

    /// Event-stream text as the server writes it.
    fn wire(frame: &StreamFrame) -> String {
        match frame {
            StreamFrame::Comment(text) => format!(": {}\n\n", text),
            StreamFrame::Event { id, name, data } => {
                let id = id.as_ref().map(|id| format!("id: {}\n", id)).unwrap_or_default();
                format!("{}event: {}\ndata: {}\n\n", id, name, data)
            }
        }
    }

    fn bot_event(id: &str) -> StoredEvent {
        ChatEvent::new(
            EventType::Message,
            Sender::bot("re_bot"),
            Payload::new(MessageType::Text, serde_json::json!({ "text": "hello" })),
        )
        .into_stored(id.to_string(), "conv_1".to_string(), Utc::now())
    }

    fn body(chunks: Vec<String>) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        futures::stream::iter(chunks.into_iter().map(|c| Ok(c.into_bytes())))
    }

    #[tokio::test]
    async fn test_frames_become_signals() {
        let event = bot_event("evt_1");
        let chunks = vec![
            wire(&StreamFrame::connected()),
            wire(&StreamFrame::chat_event(&event).unwrap()),
            wire(&StreamFrame::keepalive()),
            wire(&StreamFrame::connection_close(CloseReason::Idle)),
        ];

        let received: Vec<StreamSignal> = signals(body(chunks)).collect().await;
        assert_eq!(
            received,
            vec![
                StreamSignal::Event(event),
                StreamSignal::Close(CloseReason::Idle)
            ]
        );
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks() {
        let event = bot_event("evt_2");
        let frame = wire(&StreamFrame::chat_event(&event).unwrap());
        let (head, tail) = frame.split_at(frame.len() / 2);

        let received: Vec<StreamSignal> =
            signals(body(vec![head.to_string(), tail.to_string()]))
                .collect()
                .await;
        assert_eq!(received, vec![StreamSignal::Event(event)]);
    }

    #[tokio::test]
    async fn test_undecodable_event_is_skipped() {
        let chunks = vec![
            "event: chat_event\ndata: {not json}\n\n".to_string(),
            wire(&StreamFrame::connection_close(CloseReason::MaxIdle)),
        ];
        let received: Vec<StreamSignal> = signals(body(chunks)).collect().await;
        assert_eq!(received, vec![StreamSignal::Close(CloseReason::MaxIdle)]);
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))];
        let received: Vec<StreamSignal> = signals(futures::stream::iter(chunks)).collect().await;
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], StreamSignal::Error(_)));
    }
}
