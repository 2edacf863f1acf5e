// Client engine configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Events loaded when a conversation opens
    pub initial_page_size: usize,
    /// Events fetched per "load older" step
    pub older_page_size: usize,
    /// Window re-read before each submit
    pub sync_window: usize,
    /// Give up waiting for a reply after this long
    pub reply_timeout: Duration,
    /// First missed-message poll after a submit
    pub first_poll_delay: Duration,
    /// Missed-message poll period while awaiting
    pub poll_interval: Duration,
    pub elapsed_tick: Duration,
    /// How long a submit waits for the stream to open before going ahead
    pub stream_open_wait: Duration,
    /// How often a silently ended stream is noticed
    pub readiness_check: Duration,
    /// Sent with the context event when a conversation is new
    pub context: serde_json::Value,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_page_size: 6,
            older_page_size: 5,
            sync_window: 100,
            reply_timeout: Duration::from_secs(25),
            first_poll_delay: Duration::from_millis(400),
            poll_interval: Duration::from_millis(1500),
            elapsed_tick: Duration::from_secs(1),
            stream_open_wait: Duration::from_secs(8),
            readiness_check: Duration::from_secs(10),
            context: default_context(),
        }
    }
}

/// Page context reported when a chat opens from a search results page.
fn default_context() -> serde_json::Value {
    serde_json::json!({
        "page": "SRP",
        "service": "buy",
        "category": "residential",
        "city": "526acdc6c33455e9e4e9",
        "filters": {
            "apartment_type_id": [1, 2],
            "max_price": 4800000,
            "min_price": 100,
            "property_type_id": [1, 2],
            "type": "project"
        }
    })
}
