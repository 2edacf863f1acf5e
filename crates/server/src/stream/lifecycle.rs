// Stream lifecycle policy
//
// Evaluated on every tick with the time since the last successful write and
// whether the conversation has a reply in flight:
// - idle >= max_idle                      -> close (max_idle)
// - idle >= idle_close and nothing pending -> close (idle)
// - pending and idle >= keepalive_after   -> keepalive comment
// A keepalive is a write, so it resets the idle clock.

use std::time::Duration;

use parley_core::CloseReason;

/// Timing knobs for streaming sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLifecycle {
    pub tick: Duration,
    pub idle_close: Duration,
    pub max_idle: Duration,
    pub keepalive_after: Duration,
}

impl Default for StreamLifecycle {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            idle_close: Duration::from_secs(15),
            max_idle: Duration::from_secs(60),
            keepalive_after: Duration::from_secs(30),
        }
    }
}

/// What a session should do on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Continue,
    Keepalive,
    Close(CloseReason),
}

impl StreamLifecycle {
    pub fn evaluate(&self, idle: Duration, pending: bool) -> TickAction {
        if idle >= self.max_idle {
            TickAction::Close(CloseReason::MaxIdle)
        } else if idle >= self.idle_close && !pending {
            TickAction::Close(CloseReason::Idle)
        } else if pending && idle >= self.keepalive_after {
            TickAction::Keepalive
        } else {
            TickAction::Continue
        }
    }
}
