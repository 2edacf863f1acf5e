// Streaming session management
//
// - lifecycle: tick policy (idle close, absolute cap, keepalive)
// - session: per-connection task, channel-backed sink

pub mod lifecycle;
pub mod session;

pub use lifecycle::{StreamLifecycle, TickAction};
pub use session::{ChannelSink, SessionEnd, StreamSession};
