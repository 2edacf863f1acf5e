// Request domain types
//
// A request tracks one "user event expecting an asynchronous reply" cycle.
// State is one-way: PENDING moves to exactly one terminal state and stays
// there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Request lifecycle state.
/// - `PENDING`: waiting for the responder
/// - `COMPLETED`: responder finished and its events were appended
/// - `ERRORED_AT_ML`: responder failed
/// - `TIMED_OUT_BY_BE`: backend deadline expired before the responder finished
/// - `CANCELLED_BY_USER`: user cancelled; the triggering event is hidden from history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Pending,
    Completed,
    ErroredAtMl,
    TimedOutByBe,
    CancelledByUser,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestState::Pending => write!(f, "PENDING"),
            RequestState::Completed => write!(f, "COMPLETED"),
            RequestState::ErroredAtMl => write!(f, "ERRORED_AT_ML"),
            RequestState::TimedOutByBe => write!(f, "TIMED_OUT_BY_BE"),
            RequestState::CancelledByUser => write!(f, "CANCELLED_BY_USER"),
        }
    }
}

/// Tracked request record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub request_id: String,
    pub conversation_id: String,
    /// The triggering event. One request per triggering event.
    pub user_event_id: String,
    pub state: RequestState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRequest {
    pub fn pending(
        request_id: String,
        conversation_id: String,
        user_event_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            conversation_id,
            user_event_id,
            state: RequestState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == RequestState::Pending
    }

    /// Move to `to` if still pending. Returns whether the state changed.
    pub fn transition(&mut self, to: RequestState, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() || to == RequestState::Pending {
            return false;
        }
        self.state = to;
        self.updated_at = now;
        true
    }
}
