// Reply protocol state machine
//
// Pure and synchronous: the engine owns the timers and network calls, this
// type only decides what they mean. Every awaiting period gets a fresh
// generation; timer callbacks pass the generation they were started with and
// are ignored once it is stale, so clearing is idempotent and a late timer
// can never act on a newer (or already finished) wait.

use std::fmt;

use parley_core::{ChatEvent, StoredEvent};
use serde::Serialize;

use crate::timeline::Timeline;

/// Elapsed seconds stop counting here.
pub const ELAPSED_CAP_SECS: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Idle,
    Sending,
    Awaiting,
    Timeout,
    Error,
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplyStatus::Idle => "idle",
            ReplyStatus::Sending => "sending",
            ReplyStatus::Awaiting => "awaiting",
            ReplyStatus::Timeout => "timeout",
            ReplyStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Progress text shown while a reply is awaited.
pub fn awaiting_label(elapsed_secs: u64) -> &'static str {
    match elapsed_secs {
        0..=4 => "thinking",
        5..=9 => "Still Thinking",
        10..=14 => "Analysing",
        _ => "It's taking longer than usual, but I'm trying.",
    }
}

#[derive(Debug)]
pub struct ConversationState {
    pub conversation_id: Option<String>,
    pub timeline: Timeline,
    pub has_more_older: bool,
    pub loading_older: bool,
    status: ReplyStatus,
    sending: bool,
    awaited_event_id: Option<String>,
    elapsed_secs: u64,
    generation: u64,
    last_request_id: Option<String>,
    last_sent: Option<ChatEvent>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            conversation_id: None,
            timeline: Timeline::default(),
            has_more_older: false,
            loading_older: false,
            status: ReplyStatus::Idle,
            sending: false,
            awaited_event_id: None,
            elapsed_secs: 0,
            generation: 0,
            last_request_id: None,
            last_sent: None,
        }
    }
}

impl ConversationState {
    pub fn status(&self) -> ReplyStatus {
        self.status
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn awaited_event_id(&self) -> Option<&str> {
        self.awaited_event_id.as_deref()
    }

    pub fn last_request_id(&self) -> Option<&str> {
        self.last_request_id.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.sending || self.status == ReplyStatus::Awaiting
    }

    /// Enter `sending`. Refused while a send is in flight or a reply is awaited.
    pub fn begin_send(&mut self, event: &ChatEvent) -> bool {
        if self.conversation_id.is_none() || self.is_busy() {
            return false;
        }
        self.sending = true;
        self.status = ReplyStatus::Sending;
        self.last_sent = Some(event.clone());
        true
    }

    /// Retry is allowed from any state except while a send is in flight.
    /// Returns the stale request to cancel.
    pub fn begin_retry(&mut self) -> Option<(ChatEvent, Option<String>)> {
        if self.sending || self.conversation_id.is_none() {
            return None;
        }
        let event = self.last_sent.clone()?;
        let stale = self.last_request_id.take();
        self.clear_waiting();
        self.sending = true;
        self.status = ReplyStatus::Sending;
        Some((event, stale))
    }

    /// The server accepted the event; start waiting for its reply.
    /// Returns the generation the engine's timers must carry.
    pub fn start_awaiting(&mut self, user_event_id: &str, request_id: &str) -> u64 {
        self.sending = false;
        self.last_request_id = Some(request_id.to_string());
        self.generation += 1;
        self.awaited_event_id = Some(user_event_id.to_string());
        self.elapsed_secs = 0;
        self.status = ReplyStatus::Awaiting;
        self.generation
    }

    /// Submission failed before anything was awaited.
    pub fn fail_send(&mut self) {
        self.sending = false;
        self.status = ReplyStatus::Error;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.status == ReplyStatus::Awaiting
    }

    /// The id to poll after, if `generation` is still the live wait.
    pub fn awaited_for(&self, generation: u64) -> Option<&str> {
        if self.is_current(generation) {
            self.awaited_event_id.as_deref()
        } else {
            None
        }
    }

    /// One elapsed-seconds tick. `None` once the wait is over.
    pub fn tick_elapsed(&mut self, generation: u64) -> Option<u64> {
        if !self.is_current(generation) {
            return None;
        }
        self.elapsed_secs = (self.elapsed_secs + 1).min(ELAPSED_CAP_SECS);
        Some(self.elapsed_secs)
    }

    /// The overall reply timeout fired.
    pub fn reply_timed_out(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.end_wait();
        self.status = ReplyStatus::Timeout;
        true
    }

    /// Drop any wait and return to idle. Safe to call repeatedly.
    pub fn clear_waiting(&mut self) {
        self.end_wait();
        self.status = ReplyStatus::Idle;
    }

    /// Cancel the awaited request locally, returning its id for the server.
    pub fn cancel(&mut self) -> Option<Option<String>> {
        if self.status != ReplyStatus::Awaiting {
            return None;
        }
        let request_id = self.last_request_id.take();
        self.clear_waiting();
        Some(request_id)
    }

    /// Leave `timeout` or `error` without retrying.
    pub fn dismiss(&mut self) -> bool {
        if !matches!(self.status, ReplyStatus::Timeout | ReplyStatus::Error) {
            return false;
        }
        self.clear_waiting();
        true
    }

    /// A pushed event. Returns whether it was new.
    pub fn on_pushed(&mut self, event: StoredEvent) -> bool {
        let from_bot = event.is_from_bot();
        if !self.timeline.push(event) {
            return false;
        }
        if from_bot {
            self.reply_arrived();
        }
        true
    }

    /// Events polled after the awaited id of `generation`. Returns the new
    /// ones; they only end the wait they were polled for.
    pub fn on_polled(&mut self, generation: u64, events: Vec<StoredEvent>) -> Vec<StoredEvent> {
        let added = self.timeline.extend(events);
        if added.iter().any(StoredEvent::is_from_bot) && self.is_current(generation) {
            self.clear_waiting();
        }
        added
    }

    // Only an active wait is ended by a reply; a reply landing after a
    // timeout stays in the timeline but leaves the timeout state alone.
    fn reply_arrived(&mut self) {
        if self.status == ReplyStatus::Awaiting {
            self.clear_waiting();
        }
    }

    fn end_wait(&mut self) {
        self.generation += 1;
        self.awaited_event_id = None;
        self.elapsed_secs = 0;
    }
}
