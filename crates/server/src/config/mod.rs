// Server configuration
//
// Loaded once at startup from the environment (after `.env` via dotenvy).
// Every value has a default so a bare `parley-server` runs locally.

use std::path::PathBuf;
use std::time::Duration;

use parley_core::history::DEFAULT_AFTER_CAP;

use crate::stream::StreamLifecycle;

/// Conversation key used when the client does not supply one
pub const DEFAULT_CONVERSATION_ID: &str = "conv_1";

/// Responder delays used when mock delays are enabled without a list
pub const DEFAULT_MOCK_DELAYS_MS: [u64; 3] = [5_000, 15_000, 61_000];

/// Lets the 202 go out before the responder starts
pub const RESPONDER_HEAD_START: Duration = Duration::from_millis(100);

/// How and when the responder runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponderConfig {
    /// Artificial delays, used round-robin; empty means only the head start
    pub delays: Vec<Duration>,
    /// Backend deadline for a single responder call
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub api_prefix: String,
    pub cors_origins: Vec<String>,
    pub conversation_id: String,
    pub demo_flow_path: PathBuf,
    pub history_after_cap: usize,
    pub responder: ResponderConfig,
    pub lifecycle: StreamLifecycle,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:9000".to_string(),
            api_prefix: String::new(),
            cors_origins: Vec::new(),
            conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            demo_flow_path: PathBuf::from("demo-flow.json"),
            history_after_cap: DEFAULT_AFTER_CAP,
            responder: ResponderConfig::default(),
            lifecycle: StreamLifecycle::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let delays_enabled = get("ENABLE_MOCK_ML_DELAYS")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        let delays = if delays_enabled {
            let parsed = get("MOCK_ML_DELAYS_MS")
                .map(|v| parse_millis_list(&v))
                .unwrap_or_default();
            if parsed.is_empty() {
                DEFAULT_MOCK_DELAYS_MS
                    .iter()
                    .copied()
                    .map(Duration::from_millis)
                    .collect()
            } else {
                parsed
            }
        } else {
            Vec::new()
        };

        Self {
            addr: get("PARLEY_ADDR").unwrap_or(defaults.addr),
            api_prefix: get("API_PREFIX").unwrap_or_default(),
            cors_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            conversation_id: defaults.conversation_id,
            demo_flow_path: get("DEMO_FLOW_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.demo_flow_path),
            history_after_cap: get("HISTORY_AFTER_CAP")
                .and_then(|v| v.trim().parse().ok())
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.history_after_cap),
            responder: ResponderConfig {
                delays,
                timeout: get("RESPONDER_TIMEOUT_SECS")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            },
            lifecycle: defaults.lifecycle,
        }
    }
}

fn parse_millis_list(value: &str) -> Vec<Duration> {
    value
        .split(',')
        .filter_map(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .collect()
}
