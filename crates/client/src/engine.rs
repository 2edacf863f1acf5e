// Client reconciliation engine
//
// Drives a `ConversationState` against a `ChatTransport`: submits events,
// waits for replies with a timeout, backfills missed events by polling and
// history sync, pages older history and keeps the push stream alive.
//
// Replies can reach the client through the stream or the poll, whichever is
// first; the timeline's seen-id set makes the second delivery a no-op. Both
// keep running until the wait is cleared, even after the stream reconnects.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use parley_core::{
    ChatEvent, ConversationIdResponse, HistoryParams, HistoryQuery, SendMessageResponse,
    StoredEvent,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::client::ClientError;
use crate::config::EngineConfig;
use crate::state::{awaiting_label, ConversationState, ReplyStatus};
use crate::stream::StreamSignal;
use crate::transport::ChatTransport;

/// Push channel health as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Disconnected,
    Connecting,
    Open,
    Error,
}

/// Something a front end may want to render.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    /// An event joined the timeline (push, poll, sync or optimistic send).
    Added(StoredEvent),
    /// Older history was put in front of the timeline.
    Prepended(Vec<StoredEvent>),
    Status(ReplyStatus),
    Elapsed { secs: u64, label: &'static str },
    Stream(StreamStatus),
}

/// Outcome of a submit, retry or login call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Accepted(SendMessageResponse),
    /// Nothing was sent: a send is in flight, a reply is awaited, or there
    /// is nothing to retry.
    Ignored,
}

/// Point-in-time view of the conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub conversation_id: Option<String>,
    pub status: ReplyStatus,
    pub elapsed_secs: u64,
    pub awaiting_label: Option<&'static str>,
    pub has_more_older: bool,
    pub stream: StreamStatus,
    pub events: Vec<StoredEvent>,
}

enum StreamEnd {
    Reconnect,
    Stop,
}

struct Inner {
    transport: Arc<dyn ChatTransport>,
    config: EngineConfig,
    state: Mutex<ConversationState>,
    updates: mpsc::UnboundedSender<EngineUpdate>,
    stream_status: watch::Sender<StreamStatus>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<Inner>,
}

impl ChatEngine {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let (stream_status, _) = watch::channel(StreamStatus::Disconnected);
        let engine = Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: Mutex::new(ConversationState::default()),
                updates,
                stream_status,
                stream_task: Mutex::new(None),
                timers: Mutex::new(Vec::new()),
            }),
        };
        (engine, rx)
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.inner.state.lock().conversation_id.clone()
    }

    pub fn status(&self) -> ReplyStatus {
        self.inner.state.lock().status()
    }

    pub fn stream_status(&self) -> StreamStatus {
        *self.inner.stream_status.borrow()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock();
        let awaiting = state.status() == ReplyStatus::Awaiting;
        Snapshot {
            conversation_id: state.conversation_id.clone(),
            status: state.status(),
            elapsed_secs: state.elapsed_secs(),
            awaiting_label: awaiting.then(|| awaiting_label(state.elapsed_secs())),
            has_more_older: state.has_more_older,
            stream: self.stream_status(),
            events: state.timeline.events().to_vec(),
        }
    }

    /// Resolve the conversation, load its latest page and subscribe.
    pub async fn open(&self, demo: bool) -> Result<ConversationIdResponse, ClientError> {
        let resolved = self.inner.transport.conversation_id(demo).await?;
        let conversation_id = resolved.conversation_id.clone();
        self.inner.state.lock().conversation_id = Some(conversation_id.clone());
        tracing::info!(%conversation_id, is_new = resolved.is_new, "Conversation resolved");

        if resolved.is_new {
            let context = ChatEvent::context(&conversation_id, self.inner.config.context.clone());
            self.send_detached(context);
        }

        let params = HistoryParams::for_query(
            &conversation_id,
            &HistoryQuery::Last(self.inner.config.initial_page_size),
        );
        let history = self.inner.transport.history(&params).await?;
        {
            let mut state = self.inner.state.lock();
            state.timeline.reset(history.messages.clone());
            state.has_more_older = history.has_more;
        }
        for event in history.messages {
            self.emit(EngineUpdate::Added(event));
        }

        self.connect_stream();
        Ok(resolved)
    }

    /// Send a plain text message.
    pub async fn send_text(&self, text: &str) -> Result<Submitted, ClientError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Submitted::Ignored);
        }
        let Some(conversation_id) = self.conversation_id() else {
            return Err(ClientError::NoConversation);
        };
        self.submit(ChatEvent::user_text(conversation_id, trimmed), true)
            .await
    }

    /// Send a user action (button press, list selection).
    pub async fn send_action(&self, event: ChatEvent) -> Result<Submitted, ClientError> {
        self.submit(event, true).await
    }

    /// Report a completed login and wait for the follow-up replies.
    pub async fn login_success(&self) -> Result<Submitted, ClientError> {
        let Some(conversation_id) = self.conversation_id() else {
            return Err(ClientError::NoConversation);
        };
        let event = ChatEvent::analytics(
            conversation_id,
            serde_json::json!({
                "category": "login",
                "action": "logged_in",
                "label": "logged in using phone"
            }),
        );
        self.submit(event, false).await
    }

    /// Fire-and-forget analytics.
    pub fn track(&self, data: serde_json::Value) {
        if let Some(conversation_id) = self.conversation_id() {
            self.send_detached(ChatEvent::analytics(conversation_id, data));
        }
    }

    /// Resubmit the last event, cancelling the request it replaces.
    pub async fn retry(&self) -> Result<Submitted, ClientError> {
        let Some((event, stale)) = self.update_state(|state| state.begin_retry()) else {
            return Ok(Submitted::Ignored);
        };
        if let Some(request_id) = stale {
            self.cancel_detached(request_id);
        }

        match self.inner.transport.send_message(&event).await {
            Ok(response) => {
                self.start_awaiting(&response);
                Ok(Submitted::Accepted(response))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retry failed");
                self.update_state(|state| state.fail_send());
                Err(e)
            }
        }
    }

    /// Leave `timeout`/`error` and return to idle.
    pub fn dismiss(&self) -> bool {
        self.update_state(|state| state.dismiss())
    }

    /// Stop waiting and tell the server to drop the request.
    pub async fn cancel(&self) -> bool {
        let Some(request_id) = self.update_state(|state| state.cancel()) else {
            return false;
        };
        if let Some(request_id) = request_id {
            if let Err(e) = self.inner.transport.cancel(&request_id).await {
                tracing::warn!(%request_id, error = %e, "Cancel failed");
            }
        }
        true
    }

    /// Page one step further back. Returns how many events were prepended.
    pub async fn load_older(&self) -> Result<usize, ClientError> {
        let (conversation_id, cursor) = {
            let mut state = self.inner.state.lock();
            if state.loading_older {
                return Ok(0);
            }
            let (Some(conversation_id), Some(cursor)) = (
                state.conversation_id.clone(),
                state.timeline.oldest_id().map(str::to_string),
            ) else {
                return Ok(0);
            };
            state.loading_older = true;
            (conversation_id, cursor)
        };

        let params = HistoryParams::for_query(
            conversation_id,
            &HistoryQuery::Before {
                cursor,
                page_size: self.inner.config.older_page_size,
            },
        );
        let result = self.inner.transport.history(&params).await;

        let mut state = self.inner.state.lock();
        state.loading_older = false;
        let history = result?;
        state.has_more_older = history.has_more;
        let count = state.timeline.prepend(history.messages);
        if count > 0 {
            self.emit(EngineUpdate::Prepended(
                state.timeline.events()[..count].to_vec(),
            ));
        }
        Ok(count)
    }

    /// Merge any events from the recent window the timeline has not seen.
    pub async fn sync_history(&self) -> Result<usize, ClientError> {
        let Some(conversation_id) = self.conversation_id() else {
            return Ok(0);
        };
        let params = HistoryParams::for_query(
            conversation_id,
            &HistoryQuery::Last(self.inner.config.sync_window),
        );
        let history = self.inner.transport.history(&params).await?;

        let mut state = self.inner.state.lock();
        let added = state.timeline.merge_sorted(history.messages);
        let count = added.len();
        for event in added {
            self.emit(EngineUpdate::Added(event));
        }
        Ok(count)
    }

    /// Subscribe (again) to the push stream, replacing any current reader.
    pub fn connect_stream(&self) {
        let Some(conversation_id) = self.conversation_id() else {
            return;
        };
        self.set_stream_status(StreamStatus::Connecting);
        let task = tokio::spawn(self.clone().run_stream(conversation_id));
        if let Some(previous) = self.inner.stream_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Make sure the stream is (re)opening and give it a bounded time to
    /// open. Proceeds either way.
    pub async fn ensure_stream_connected(&self) {
        if self.conversation_id().is_none() {
            return;
        }
        let mut status = self.inner.stream_status.subscribe();
        let current = *status.borrow_and_update();
        match current {
            StreamStatus::Open => return,
            StreamStatus::Disconnected | StreamStatus::Error => self.connect_stream(),
            StreamStatus::Connecting => {}
        }

        let opened = tokio::time::timeout(
            self.inner.config.stream_open_wait,
            status.wait_for(|s| *s == StreamStatus::Open),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
        if !opened {
            tracing::debug!("Stream not open yet; sending anyway");
        }
    }

    /// Stop the stream reader and every timer.
    pub fn close(&self) {
        if let Some(task) = self.inner.stream_task.lock().take() {
            task.abort();
        }
        self.stop_timers();
        self.set_stream_status(StreamStatus::Disconnected);
    }

    async fn submit(&self, event: ChatEvent, optimistic: bool) -> Result<Submitted, ClientError> {
        let accepted = self.update_state(|state| {
            let Some(conversation_id) = state.conversation_id.clone() else {
                return None;
            };
            let event = event.in_conversation(conversation_id);
            if !state.begin_send(&event) {
                return None;
            }
            let pending = optimistic.then(|| {
                let temp_id = state.timeline.insert_pending(event.clone());
                if let Some(entry) = state.timeline.events().last() {
                    self.emit(EngineUpdate::Added(entry.clone()));
                }
                temp_id
            });
            Some((event, pending))
        });
        let Some((event, pending)) = accepted else {
            return Ok(Submitted::Ignored);
        };

        self.ensure_stream_connected().await;
        if let Err(e) = self.sync_history().await {
            tracing::debug!(error = %e, "History sync before send failed");
        }

        match self.inner.transport.send_message(&event).await {
            Ok(response) => {
                if let Some(temp_id) = &pending {
                    self.inner
                        .state
                        .lock()
                        .timeline
                        .confirm_pending(temp_id, &response.event_id);
                }
                tracing::debug!(
                    event_id = %response.event_id,
                    request_id = %response.request_id,
                    "Event accepted"
                );
                self.start_awaiting(&response);
                Ok(Submitted::Accepted(response))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Send failed");
                self.update_state(|state| {
                    state.fail_send();
                    if let Some(temp_id) = &pending {
                        state.timeline.discard_pending(temp_id);
                    }
                });
                Err(e)
            }
        }
    }

    fn start_awaiting(&self, response: &SendMessageResponse) {
        let generation = self.update_state(|state| {
            state.start_awaiting(&response.event_id, &response.request_id)
        });
        self.emit(EngineUpdate::Elapsed {
            secs: 0,
            label: awaiting_label(0),
        });

        let timers = vec![
            tokio::spawn(self.clone().elapsed_timer(generation)),
            tokio::spawn(self.clone().reply_timer(generation)),
            tokio::spawn(self.clone().poll_timer(generation)),
        ];
        let stale = std::mem::replace(&mut *self.inner.timers.lock(), timers);
        for timer in stale {
            timer.abort();
        }
    }

    async fn elapsed_timer(self, generation: u64) {
        let tick = self.inner.config.elapsed_tick;
        let mut ticker = interval_at(Instant::now() + tick, tick);
        loop {
            ticker.tick().await;
            let Some(secs) = self.inner.state.lock().tick_elapsed(generation) else {
                return;
            };
            self.emit(EngineUpdate::Elapsed {
                secs,
                label: awaiting_label(secs),
            });
        }
    }

    async fn reply_timer(self, generation: u64) {
        tokio::time::sleep(self.inner.config.reply_timeout).await;
        if self.update_state(|state| state.reply_timed_out(generation)) {
            tracing::info!("No reply before the timeout");
        }
    }

    async fn poll_timer(self, generation: u64) {
        let started = Instant::now();
        tokio::time::sleep(self.inner.config.first_poll_delay).await;
        self.poll_missed(generation).await;

        let period = self.inner.config.poll_interval;
        let mut ticker = interval_at(started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.poll_missed(generation).await {
                return;
            }
        }
    }

    /// One backstop poll. Returns false once the wait is over.
    async fn poll_missed(&self, generation: u64) -> bool {
        let (Some(conversation_id), Some(after)) = ({
            let state = self.inner.state.lock();
            (
                state.conversation_id.clone(),
                state.awaited_for(generation).map(str::to_string),
            )
        }) else {
            return false;
        };

        let params =
            HistoryParams::for_query(conversation_id, &HistoryQuery::After { cursor: after });
        match self.inner.transport.history(&params).await {
            Ok(history) => {
                self.update_state(|state| {
                    for event in state.on_polled(generation, history.messages) {
                        self.emit(EngineUpdate::Added(event));
                    }
                });
            }
            Err(e) => tracing::debug!(error = %e, "Missed-message poll failed"),
        }
        true
    }

    async fn run_stream(self, conversation_id: String) {
        loop {
            match self.follow_stream(&conversation_id).await {
                StreamEnd::Reconnect => {
                    tracing::info!(%conversation_id, "Resubscribing while a reply is awaited");
                }
                StreamEnd::Stop => return,
            }
        }
    }

    async fn follow_stream(&self, conversation_id: &str) -> StreamEnd {
        self.set_stream_status(StreamStatus::Connecting);
        let mut signals = match self.inner.transport.open_stream(conversation_id).await {
            Ok(signals) => signals,
            Err(e) => {
                tracing::warn!(error = %e, "Stream failed to open");
                self.set_stream_status(StreamStatus::Error);
                return StreamEnd::Stop;
            }
        };
        self.set_stream_status(StreamStatus::Open);

        let check = self.inner.config.readiness_check;
        let mut readiness = interval_at(Instant::now() + check, check);
        let mut ended = false;
        loop {
            tokio::select! {
                signal = signals.next(), if !ended => match signal {
                    Some(StreamSignal::Event(event)) => self.apply_pushed(event),
                    Some(StreamSignal::Close(reason)) => {
                        tracing::info!(%reason, "Server closed the stream");
                        self.set_stream_status(StreamStatus::Error);
                        return self.resubscribe_if_awaiting();
                    }
                    Some(StreamSignal::Error(e)) => {
                        tracing::warn!(error = %e, "Stream error");
                        self.set_stream_status(StreamStatus::Error);
                        return StreamEnd::Stop;
                    }
                    // Ended without notice; the next readiness check finds it.
                    None => ended = true,
                },
                _ = readiness.tick() => {
                    if ended {
                        tracing::debug!("Stream found closed by readiness check");
                        self.set_stream_status(StreamStatus::Error);
                        return self.resubscribe_if_awaiting();
                    }
                }
            }
        }
    }

    fn resubscribe_if_awaiting(&self) -> StreamEnd {
        if self.status() == ReplyStatus::Awaiting {
            StreamEnd::Reconnect
        } else {
            StreamEnd::Stop
        }
    }

    fn apply_pushed(&self, event: StoredEvent) {
        self.update_state(|state| {
            if state.on_pushed(event.clone()) {
                self.emit(EngineUpdate::Added(event));
            }
        });
    }

    fn send_detached(&self, event: ChatEvent) {
        let transport = Arc::clone(&self.inner.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send_message(&event).await {
                tracing::warn!(
                    message_type = %event.payload.message_type,
                    error = %e,
                    "Background send failed"
                );
            }
        });
    }

    fn cancel_detached(&self, request_id: String) {
        let transport = Arc::clone(&self.inner.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.cancel(&request_id).await {
                tracing::debug!(%request_id, error = %e, "Cancel of stale request failed");
            }
        });
    }

    /// Apply `f` to the state, then announce a status change. Leaving
    /// `awaiting` stops every timer of the finished wait.
    fn update_state<R>(&self, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let (result, before, after) = {
            let mut state = self.inner.state.lock();
            let before = state.status();
            let result = f(&mut state);
            (result, before, state.status())
        };
        if before != after {
            self.emit(EngineUpdate::Status(after));
            if before == ReplyStatus::Awaiting {
                self.stop_timers();
            }
        }
        result
    }

    fn stop_timers(&self) {
        for timer in self.inner.timers.lock().drain(..) {
            timer.abort();
        }
    }

    fn set_stream_status(&self, status: StreamStatus) {
        let changed = self.inner.stream_status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            self.emit(EngineUpdate::Stream(status));
        }
    }

    fn emit(&self, update: EngineUpdate) {
        // No receiver just means nobody is rendering.
        let _ = self.inner.updates.send(update);
    }
}
