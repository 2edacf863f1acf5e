// Message submission service
//
// Records a submitted event, opens its request and kicks off the responder in
// the background (don't block the response):
// - responder output is appended in order, then the request is COMPLETED
// - responder error -> ERRORED_AT_ML
// - backend deadline elapsed -> TIMED_OUT_BY_BE, late output discarded
// - cancellation is advisory: the responder still runs and its output is
//   appended, the request stays CANCELLED_BY_USER

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parley_core::{ChatEvent, Responder, Result, SendMessageResponse, StoredEvent};
use tokio::task::JoinHandle;

use super::{EventService, RequestService};
use crate::config::{ResponderConfig, RESPONDER_HEAD_START};

pub struct MessageService {
    events: Arc<EventService>,
    requests: Arc<RequestService>,
    responder: Arc<dyn Responder>,
    config: ResponderConfig,
    default_conversation_id: String,
    next_delay: AtomicUsize,
}

impl MessageService {
    pub fn new(
        events: Arc<EventService>,
        requests: Arc<RequestService>,
        responder: Arc<dyn Responder>,
        config: ResponderConfig,
        default_conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            events,
            requests,
            responder,
            config,
            default_conversation_id: default_conversation_id.into(),
            next_delay: AtomicUsize::new(0),
        }
    }

    /// Record the event, open a request and schedule the responder.
    ///
    /// Returns as soon as the event and request are recorded.
    pub async fn submit(&self, event: ChatEvent) -> Result<SendMessageResponse> {
        self.submit_tracked(event).await.map(|(response, _)| response)
    }

    /// Like [`submit`](Self::submit), also handing back the responder task.
    pub async fn submit_tracked(
        &self,
        event: ChatEvent,
    ) -> Result<(SendMessageResponse, JoinHandle<()>)> {
        let expect_response = event.expects_response();
        let stored = self
            .events
            .append(event, &self.default_conversation_id)
            .await?;
        let request = self
            .requests
            .create(&stored.conversation_id, &stored.event_id)
            .await?;

        tracing::info!(
            conversation_id = %stored.conversation_id,
            event_id = %stored.event_id,
            request_id = %request.request_id,
            message_type = %stored.payload.message_type,
            expect_response,
            "Message submitted"
        );

        let run = ResponderRun {
            events: self.events.clone(),
            requests: self.requests.clone(),
            responder: self.responder.clone(),
            delay: self.next_delay(),
            timeout: self.config.timeout,
            request_id: request.request_id.clone(),
            trigger: stored.clone(),
        };
        let handle = tokio::spawn(run.run());

        Ok((
            SendMessageResponse {
                event_id: stored.event_id,
                request_id: request.request_id,
                expect_response,
            },
            handle,
        ))
    }

    /// Next configured delay, never shorter than the head start so the
    /// submit response goes out before any reply.
    fn next_delay(&self) -> Duration {
        if self.config.delays.is_empty() {
            return RESPONDER_HEAD_START;
        }
        let idx = self.next_delay.fetch_add(1, Ordering::Relaxed) % self.config.delays.len();
        self.config.delays[idx].max(RESPONDER_HEAD_START)
    }
}

struct ResponderRun {
    events: Arc<EventService>,
    requests: Arc<RequestService>,
    responder: Arc<dyn Responder>,
    delay: Duration,
    timeout: Option<Duration>,
    request_id: String,
    trigger: StoredEvent,
}

impl ResponderRun {
    async fn run(self) {
        tokio::time::sleep(self.delay).await;

        let conversation_id = self.trigger.conversation_id.clone();
        let history = match self.events.full_log(&conversation_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(conversation_id = %conversation_id, error = %e, "Failed to load history");
                self.settle_failed().await;
                return;
            }
        };

        let latest = self.trigger.to_event();
        let call = self.responder.respond(&latest, &history);
        let outcome = match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        request_id = %self.request_id,
                        responder = self.responder.name(),
                        timeout_secs = deadline.as_secs(),
                        "Responder timed out"
                    );
                    if let Err(e) = self.requests.time_out(&self.request_id).await {
                        tracing::error!(request_id = %self.request_id, error = %e, "Failed to time out request");
                    }
                    return;
                }
            },
            None => call.await,
        };

        let replies = match outcome {
            Ok(replies) => replies,
            Err(e) => {
                tracing::error!(
                    request_id = %self.request_id,
                    responder = self.responder.name(),
                    error = %e,
                    "Responder failed"
                );
                self.settle_failed().await;
                return;
            }
        };

        let count = replies.len();
        for reply in replies {
            if let Err(e) = self.events.append(reply, &conversation_id).await {
                tracing::error!(request_id = %self.request_id, error = %e, "Failed to record reply");
                self.settle_failed().await;
                return;
            }
        }

        match self.requests.complete(&self.request_id).await {
            Ok(_) => tracing::info!(
                conversation_id = %conversation_id,
                request_id = %self.request_id,
                replies = count,
                "Responder finished"
            ),
            Err(e) => {
                tracing::error!(request_id = %self.request_id, error = %e, "Failed to complete request")
            }
        }
    }

    async fn settle_failed(&self) {
        if let Err(e) = self.requests.fail(&self.request_id).await {
            tracing::error!(request_id = %self.request_id, error = %e, "Failed to mark request errored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Broadcaster;
    use crate::storage::Storage;
    use async_trait::async_trait;
    use parley_core::history::DEFAULT_AFTER_CAP;
    use parley_core::{
        ChatError, EventType, HistoryQuery, MessageType, Payload, RequestState, Sender,
        SilentResponder,
    };
    use serde_json::json;

    struct EchoResponder {
        delay: Duration,
    }

    #[async_trait]
    impl Responder for EchoResponder {
        async fn respond(&self, latest: &ChatEvent, history: &[StoredEvent]) -> Result<Vec<ChatEvent>> {
            tokio::time::sleep(self.delay).await;
            let text = latest.payload.text().unwrap_or_default().to_string();
            Ok(vec![
                ChatEvent::new(
                    EventType::Message,
                    Sender::bot("re_bot"),
                    Payload::new(MessageType::Text, json!({ "text": format!("echo: {text}") })),
                ),
                ChatEvent::new(
                    EventType::Message,
                    Sender::bot("re_bot"),
                    Payload::new(
                        MessageType::Text,
                        json!({ "text": format!("seen {} events", history.len()) }),
                    ),
                ),
            ])
        }
    }

    struct FailingResponder;

    #[async_trait]
    impl Responder for FailingResponder {
        async fn respond(&self, _: &ChatEvent, _: &[StoredEvent]) -> Result<Vec<ChatEvent>> {
            Err(ChatError::responder("model unavailable"))
        }
    }

    struct Fixture {
        service: MessageService,
        events: Arc<EventService>,
        requests: Arc<RequestService>,
    }

    fn fixture(responder: Arc<dyn Responder>, config: ResponderConfig) -> Fixture {
        let storage = Storage::in_memory();
        let events = Arc::new(EventService::new(
            storage.events.clone(),
            storage.requests.clone(),
            Broadcaster::new(),
            DEFAULT_AFTER_CAP,
        ));
        let requests = Arc::new(RequestService::new(storage.requests.clone()));
        let service = MessageService::new(
            events.clone(),
            requests.clone(),
            responder,
            config,
            "conv_1",
        );
        Fixture {
            service,
            events,
            requests,
        }
    }

    async fn state(requests: &RequestService, request_id: &str) -> RequestState {
        requests.get(request_id).await.unwrap().unwrap().state
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_returns_before_responder_runs() {
        let f = fixture(
            Arc::new(EchoResponder {
                delay: Duration::from_secs(10),
            }),
            ResponderConfig::default(),
        );

        let (response, handle) = f
            .service
            .submit_tracked(ChatEvent::user_text("conv_1", "hi"))
            .await
            .unwrap();
        assert!(response.expect_response);
        assert!(f.requests.is_pending(&response.request_id).await.unwrap());
        assert_eq!(f.events.full_log("conv_1").await.unwrap().len(), 1);

        handle.await.unwrap();
        assert_eq!(state(&f.requests, &response.request_id).await, RequestState::Completed);

        let log = f.events.full_log("conv_1").await.unwrap();
        let texts: Vec<_> = log.iter().filter_map(|e| e.payload.text()).collect();
        assert_eq!(texts, vec!["hi", "echo: hi", "seen 1 events"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_and_analytics_do_not_expect_response() {
        let f = fixture(Arc::new(SilentResponder), ResponderConfig::default());

        let context = f
            .service
            .submit(ChatEvent::context("conv_1", json!({ "page": "home" })))
            .await
            .unwrap();
        assert!(!context.expect_response);

        let analytics = f
            .service
            .submit(ChatEvent::analytics("conv_1", json!({ "action": "viewed" })))
            .await
            .unwrap();
        assert!(!analytics.expect_response);
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_error_marks_request_errored() {
        let f = fixture(Arc::new(FailingResponder), ResponderConfig::default());
        let (response, handle) = f
            .service
            .submit_tracked(ChatEvent::user_text("conv_1", "hi"))
            .await
            .unwrap();
        handle.await.unwrap();
        assert_eq!(state(&f.requests, &response.request_id).await, RequestState::ErroredAtMl);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_deadline_discards_late_output() {
        let f = fixture(
            Arc::new(EchoResponder {
                delay: Duration::from_secs(30),
            }),
            ResponderConfig {
                delays: Vec::new(),
                timeout: Some(Duration::from_secs(20)),
            },
        );
        let (response, handle) = f
            .service
            .submit_tracked(ChatEvent::user_text("conv_1", "hi"))
            .await
            .unwrap();
        handle.await.unwrap();

        assert_eq!(state(&f.requests, &response.request_id).await, RequestState::TimedOutByBe);
        assert_eq!(f.events.full_log("conv_1").await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_does_not_stop_responder() {
        let f = fixture(
            Arc::new(EchoResponder {
                delay: Duration::ZERO,
            }),
            ResponderConfig {
                delays: vec![Duration::from_secs(5)],
                timeout: None,
            },
        );
        let (response, handle) = f
            .service
            .submit_tracked(ChatEvent::user_text("conv_1", "never mind"))
            .await
            .unwrap();
        f.requests.cancel(&response.request_id).await.unwrap();
        handle.await.unwrap();

        assert_eq!(
            state(&f.requests, &response.request_id).await,
            RequestState::CancelledByUser
        );
        assert_eq!(f.events.full_log("conv_1").await.unwrap().len(), 3);

        // The trigger is hidden; the replies are not.
        let visible = f
            .events
            .query("conv_1", &HistoryQuery::All)
            .await
            .unwrap();
        let texts: Vec<_> = visible.events.iter().filter_map(|e| e.payload.text()).collect();
        assert_eq!(texts, vec!["echo: never mind", "seen 1 events"]);
        assert!(visible.events.iter().all(|e| e.is_from_bot()));
    }

    #[tokio::test]
    async fn test_delays_rotate() {
        let f = fixture(
            Arc::new(SilentResponder),
            ResponderConfig {
                delays: vec![
                    Duration::from_millis(500),
                    Duration::ZERO,
                    Duration::from_millis(1500),
                ],
                timeout: None,
            },
        );
        assert_eq!(f.service.next_delay(), Duration::from_millis(500));
        // A zero delay still leaves the head start.
        assert_eq!(f.service.next_delay(), RESPONDER_HEAD_START);
        assert_eq!(f.service.next_delay(), Duration::from_millis(1500));
        assert_eq!(f.service.next_delay(), Duration::from_millis(500));

        let f = fixture(Arc::new(SilentResponder), ResponderConfig::default());
        assert_eq!(f.service.next_delay(), RESPONDER_HEAD_START);
    }
}
