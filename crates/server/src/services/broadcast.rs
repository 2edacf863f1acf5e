// Delivery broadcaster
//
// Fans bot events out to the live stream sessions of a conversation.
// Decision: No buffering or replay; a subscriber that is not attached when an
// event is published never sees it on the stream (clients catch up by polling)
// Decision: Sinks are snapshotted under the lock and written outside it, so a
// sink may unsubscribe itself while being written to

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use parley_core::{FrameSink, StoredEvent, StreamFrame};

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<String, HashMap<u64, Arc<dyn FrameSink>>>,
}

impl Registry {
    fn remove(&mut self, conversation_id: &str, id: u64) {
        if let Some(sinks) = self.subscribers.get_mut(conversation_id) {
            sinks.remove(&id);
            if sinks.is_empty() {
                self.subscribers.remove(conversation_id);
            }
        }
    }
}

/// Per-conversation registry of live sinks
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sink to a conversation. The sink stays registered until the
    /// returned guard is released or dropped.
    pub fn subscribe(&self, conversation_id: &str, sink: Arc<dyn FrameSink>) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .subscribers
            .entry(conversation_id.to_string())
            .or_default()
            .insert(id, sink);

        tracing::debug!(conversation_id = %conversation_id, subscriber = id, "Stream subscribed");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            conversation_id: conversation_id.to_string(),
            id,
            released: false,
        }
    }

    /// Hand the framed event to every live sink of the conversation.
    ///
    /// Returns the number of sinks that accepted the frame. A failing sink
    /// does not affect delivery to the others.
    pub fn publish(&self, conversation_id: &str, event: &StoredEvent) -> usize {
        let sinks: Vec<Arc<dyn FrameSink>> = match self.registry.lock().subscribers.get(conversation_id)
        {
            Some(sinks) => sinks.values().cloned().collect(),
            None => return 0,
        };

        let frame = match StreamFrame::chat_event(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "Failed to frame event");
                return 0;
            }
        };

        let delivered = sinks
            .iter()
            .filter(|sink| sink.send_frame(&frame).is_ok())
            .count();

        tracing::debug!(
            conversation_id = %conversation_id,
            event_id = %event.event_id,
            subscribers = sinks.len(),
            delivered,
            "Published event"
        );
        delivered
    }

    pub fn subscriber_count(&self, conversation_id: &str) -> usize {
        self.registry
            .lock()
            .subscribers
            .get(conversation_id)
            .map_or(0, HashMap::len)
    }
}

/// Registration guard; unsubscribes on release or drop.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    conversation_id: String,
    id: u64,
    released: bool,
}

impl Subscription {
    /// Detach now. Idempotent with the drop path.
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.conversation_id, self.id);
            tracing::debug!(
                conversation_id = %self.conversation_id,
                subscriber = self.id,
                "Stream unsubscribed"
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_core::{ChatEvent, EventType, MessageType, Payload, Sender, SinkClosed};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<StreamFrame>>,
        broken: bool,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, frame: &StreamFrame) -> Result<(), SinkClosed> {
            if self.broken {
                return Err(SinkClosed);
            }
            self.frames.lock().push(frame.clone());
            Ok(())
        }
    }

    fn bot_event(id: &str) -> StoredEvent {
        ChatEvent::new(
            EventType::Message,
            Sender::bot("re_bot"),
            Payload::new(MessageType::Text, json!({ "text": "hi" })),
        )
        .into_stored(id.to_string(), "conv_1".to_string(), Utc::now())
    }

    #[test]
    fn test_publish_reaches_every_subscriber_of_the_conversation() {
        let broadcaster = Broadcaster::new();
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let other = Arc::new(RecordingSink::default());
        let _sa = broadcaster.subscribe("conv_1", a.clone());
        let _sb = broadcaster.subscribe("conv_1", b.clone());
        let _so = broadcaster.subscribe("conv_2", other.clone());

        let event = bot_event("evt_1");
        assert_eq!(broadcaster.publish("conv_1", &event), 2);

        let frame = a.frames.lock()[0].clone();
        assert_eq!(frame, StreamFrame::chat_event(&event).unwrap());
        assert_eq!(b.frames.lock().len(), 1);
        assert!(other.frames.lock().is_empty());
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let broadcaster = Broadcaster::new();
        let broken = Arc::new(RecordingSink {
            broken: true,
            ..Default::default()
        });
        let healthy = Arc::new(RecordingSink::default());
        let _s1 = broadcaster.subscribe("conv_1", broken);
        let _s2 = broadcaster.subscribe("conv_1", healthy.clone());

        assert_eq!(broadcaster.publish("conv_1", &bot_event("evt_1")), 1);
        assert_eq!(healthy.frames.lock().len(), 1);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let broadcaster = Broadcaster::new();
        let sink = Arc::new(RecordingSink::default());

        let subscription = broadcaster.subscribe("conv_1", sink.clone());
        assert_eq!(broadcaster.subscriber_count("conv_1"), 1);
        drop(subscription);
        assert_eq!(broadcaster.subscriber_count("conv_1"), 0);

        let subscription = broadcaster.subscribe("conv_1", sink.clone());
        subscription.release();
        assert_eq!(broadcaster.publish("conv_1", &bot_event("evt_2")), 0);
        assert!(sink.frames.lock().is_empty());
    }
}
