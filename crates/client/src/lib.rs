// Parley Client
//
// Reconciling chat client: HTTP transport, push stream reader and the
// protocol state machine that keeps a conversation timeline consistent across
// pushes, polls, history sync and reconnects. Used by the `parley` CLI.

pub mod client;
pub mod config;
pub mod engine;
pub mod state;
pub mod stream;
pub mod timeline;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::EngineConfig;
pub use engine::{ChatEngine, EngineUpdate, Snapshot, StreamStatus, Submitted};
pub use state::{awaiting_label, ConversationState, ReplyStatus};
pub use stream::{StreamSignal, SignalStream};
pub use timeline::Timeline;
pub use transport::{ChatTransport, HttpTransport};
