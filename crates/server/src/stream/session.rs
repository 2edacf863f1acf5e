// Streaming session
//
// One long-lived push connection: CONNECTING -> OPEN -> CLOSED.
// Decision: The session is a spawned task driving its own tick timer; the
// broadcaster writes into it through the same guarded writer, so every
// successful write (events included) resets the idle clock
// Decision: Write failure and client disconnect close silently; only lifecycle
// closes send `connection_close`

use std::future::Future;
use std::sync::Arc;

use axum::response::sse::Event as SseEvent;
use parking_lot::Mutex;
use parley_core::{CloseReason, FrameSink, SinkClosed, StreamFrame};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::lifecycle::{StreamLifecycle, TickAction};
use crate::services::{Broadcaster, RequestService};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Closed by the lifecycle policy; the client was notified.
    Lifecycle(CloseReason),
    /// A write to the transport failed.
    WriteFailed,
    /// The client went away.
    Disconnected,
}

/// [`FrameSink`] over a bounded channel feeding the SSE response.
///
/// A full buffer counts as a write failure.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SseEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SseEvent>) -> Self {
        Self { tx }
    }

    /// Resolves once the receiving side (the response body) is dropped.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, frame: &StreamFrame) -> Result<(), SinkClosed> {
        self.tx.try_send(to_sse(frame)).map_err(|_| SinkClosed)
    }
}

fn to_sse(frame: &StreamFrame) -> SseEvent {
    match frame {
        StreamFrame::Comment(text) => SseEvent::default().comment(text),
        StreamFrame::Event { id, name, data } => {
            let event = match id {
                Some(id) => SseEvent::default().id(id),
                None => SseEvent::default(),
            };
            event.event(name).data(data)
        }
    }
}

enum Phase {
    Open,
    Closed,
}

struct WriterState {
    phase: Phase,
    last_write: Instant,
}

/// Guarded writer shared by the session loop and the broadcaster.
struct SessionWriter {
    sink: Arc<dyn FrameSink>,
    state: Mutex<WriterState>,
    broken: Notify,
}

impl SessionWriter {
    fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(WriterState {
                phase: Phase::Open,
                last_write: Instant::now(),
            }),
            broken: Notify::new(),
        }
    }

    fn idle(&self) -> std::time::Duration {
        self.state.lock().last_write.elapsed()
    }

    fn close(&self) {
        self.state.lock().phase = Phase::Closed;
    }
}

impl FrameSink for SessionWriter {
    fn send_frame(&self, frame: &StreamFrame) -> Result<(), SinkClosed> {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Closed) {
            return Err(SinkClosed);
        }
        match self.sink.send_frame(frame) {
            Ok(()) => {
                state.last_write = Instant::now();
                Ok(())
            }
            Err(e) => {
                state.phase = Phase::Closed;
                self.broken.notify_one();
                Err(e)
            }
        }
    }
}

pub struct StreamSession {
    conversation_id: String,
    writer: Arc<SessionWriter>,
    lifecycle: StreamLifecycle,
    requests: Arc<RequestService>,
}

impl StreamSession {
    pub fn new(
        conversation_id: impl Into<String>,
        sink: Arc<dyn FrameSink>,
        lifecycle: StreamLifecycle,
        requests: Arc<RequestService>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            writer: Arc::new(SessionWriter::new(sink)),
            lifecycle,
            requests,
        }
    }

    /// Drive the session until it closes. `disconnected` resolves when the
    /// client goes away.
    pub async fn run<F>(self, broadcaster: &Broadcaster, disconnected: F) -> SessionEnd
    where
        F: Future<Output = ()>,
    {
        if self.writer.send_frame(&StreamFrame::connected()).is_err() {
            tracing::debug!(conversation_id = %self.conversation_id, "Stream closed before open");
            return SessionEnd::WriteFailed;
        }

        let subscription = broadcaster.subscribe(&self.conversation_id, self.writer.clone());
        tracing::info!(conversation_id = %self.conversation_id, "Stream opened");

        let mut ticker = interval_at(Instant::now() + self.lifecycle.tick, self.lifecycle.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(disconnected);

        let end = loop {
            tokio::select! {
                _ = &mut disconnected => break SessionEnd::Disconnected,
                _ = self.writer.broken.notified() => break SessionEnd::WriteFailed,
                _ = ticker.tick() => {
                    if let Some(end) = self.on_tick().await {
                        break end;
                    }
                }
            }
        };

        self.writer.close();
        subscription.release();

        tracing::info!(
            conversation_id = %self.conversation_id,
            end = ?end,
            "Stream closed"
        );
        end
    }

    async fn on_tick(&self) -> Option<SessionEnd> {
        let pending = match self.requests.has_pending(&self.conversation_id).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(conversation_id = %self.conversation_id, error = %e, "Pending check failed");
                false
            }
        };

        match self.lifecycle.evaluate(self.writer.idle(), pending) {
            TickAction::Continue => None,
            TickAction::Keepalive => match self.writer.send_frame(&StreamFrame::keepalive()) {
                Ok(()) => None,
                Err(_) => Some(SessionEnd::WriteFailed),
            },
            TickAction::Close(reason) => {
                // Best effort; the session closes either way.
                let _ = self.writer.send_frame(&StreamFrame::connection_close(reason));
                Some(SessionEnd::Lifecycle(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDatabase;
    use chrono::Utc;
    use parley_core::{ChatEvent, EventType, MessageType, Payload, Sender};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<StreamFrame>>,
        fail: Mutex<bool>,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<StreamFrame> {
            self.frames.lock().clone()
        }
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, frame: &StreamFrame) -> Result<(), SinkClosed> {
            if *self.fail.lock() {
                return Err(SinkClosed);
            }
            self.frames.lock().push(frame.clone());
            Ok(())
        }
    }

    struct Harness {
        sink: Arc<RecordingSink>,
        requests: Arc<RequestService>,
        broadcaster: Broadcaster,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                sink: Arc::new(RecordingSink::default()),
                requests: Arc::new(RequestService::new(Arc::new(InMemoryDatabase::new()))),
                broadcaster: Broadcaster::new(),
            }
        }

        fn spawn(&self) -> (tokio::task::JoinHandle<SessionEnd>, oneshot::Sender<()>) {
            let session = StreamSession::new(
                "conv_1",
                self.sink.clone(),
                StreamLifecycle::default(),
                self.requests.clone(),
            );
            let broadcaster = self.broadcaster.clone();
            let (tx, rx) = oneshot::channel::<()>();
            let handle = tokio::spawn(async move {
                session
                    .run(&broadcaster, async move {
                        let _ = rx.await;
                    })
                    .await
            });
            (handle, tx)
        }
    }

    fn bot_event() -> parley_core::StoredEvent {
        ChatEvent::new(
            EventType::Message,
            Sender::bot("re_bot"),
            Payload::new(MessageType::Text, json!({ "text": "hello" })),
        )
        .into_stored("evt_bot".to_string(), "conv_1".to_string(), Utc::now())
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_closes_with_notification() {
        let harness = Harness::new();
        let (handle, _disconnect) = harness.spawn();

        sleep_secs(11).await;
        assert!(!handle.is_finished());
        assert_eq!(harness.sink.frames(), vec![StreamFrame::connected()]);
        assert_eq!(harness.broadcaster.subscriber_count("conv_1"), 1);

        let end = handle.await.unwrap();
        assert_eq!(end, SessionEnd::Lifecycle(CloseReason::Idle));
        assert_eq!(
            harness.sink.frames(),
            vec![
                StreamFrame::connected(),
                StreamFrame::connection_close(CloseReason::Idle)
            ]
        );
        assert_eq!(harness.broadcaster.subscriber_count("conv_1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_request_keeps_session_alive() {
        let harness = Harness::new();
        let request = harness.requests.create("conv_1", "evt_1").await.unwrap();
        let start = Instant::now();
        let (handle, _disconnect) = harness.spawn();

        // Past the 15s idle close: still open, nothing written yet.
        sleep_secs(26).await;
        assert!(!handle.is_finished());
        assert_eq!(harness.sink.frames().len(), 1);

        // Keepalive at 30s.
        sleep_secs(6).await;
        assert_eq!(
            harness.sink.frames(),
            vec![StreamFrame::connected(), StreamFrame::keepalive()]
        );

        // Reply completes at ~32s; idle is measured from the keepalive, so
        // the idle close comes at the 45s tick.
        harness.requests.complete(&request.request_id).await.unwrap();
        let end = handle.await.unwrap();
        assert_eq!(end, SessionEnd::Lifecycle(CloseReason::Idle));
        assert_eq!(start.elapsed(), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_published_event_resets_idle_clock() {
        let harness = Harness::new();
        let start = Instant::now();
        let (handle, _disconnect) = harness.spawn();

        sleep_secs(12).await;
        let event = bot_event();
        assert_eq!(harness.broadcaster.publish("conv_1", &event), 1);

        let end = handle.await.unwrap();
        assert_eq!(end, SessionEnd::Lifecycle(CloseReason::Idle));
        // Event at 12s, so the 15s rule fires at the 30s tick, not the 15s one.
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(
            harness.sink.frames()[1],
            StreamFrame::chat_event(&event).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_disconnect_closes_silently() {
        let harness = Harness::new();
        let (handle, disconnect) = harness.spawn();

        sleep_secs(3).await;
        disconnect.send(()).unwrap();

        assert_eq!(handle.await.unwrap(), SessionEnd::Disconnected);
        assert_eq!(harness.sink.frames(), vec![StreamFrame::connected()]);
        assert_eq!(harness.broadcaster.subscriber_count("conv_1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_closes_silently() {
        let harness = Harness::new();
        let (handle, _disconnect) = harness.spawn();

        sleep_secs(2).await;
        *harness.sink.fail.lock() = true;
        assert_eq!(harness.broadcaster.publish("conv_1", &bot_event()), 0);

        assert_eq!(handle.await.unwrap(), SessionEnd::WriteFailed);
        assert_eq!(harness.sink.frames(), vec![StreamFrame::connected()]);
        assert_eq!(harness.broadcaster.subscriber_count("conv_1"), 0);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);
        assert!(sink.send_frame(&StreamFrame::connected()).is_ok());
        // Buffer full.
        assert_eq!(sink.send_frame(&StreamFrame::keepalive()), Err(SinkClosed));

        let closed = sink.closed();
        drop(rx);
        closed.await;
        assert_eq!(sink.send_frame(&StreamFrame::keepalive()), Err(SinkClosed));
    }
}
