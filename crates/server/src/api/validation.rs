// Input validation for submitted events
//
// Structural checks run on the raw JSON before it becomes a `ChatEvent`, so
// a missing field produces a precise 400 and nothing is recorded.

use parley_core::ChatEvent;
use serde_json::Value;

use super::common::ApiError;

// =============================================================================
// Input Size Limits
// =============================================================================

/// Maximum serialized size of a submitted event.
/// 256 KB leaves room for template payloads.
pub const MAX_EVENT_BYTES: usize = 256 * 1024;

// =============================================================================
// Validation Functions
// =============================================================================

/// Validation failure with the message returned to the client
#[derive(Debug, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::bad_request(e.0)
    }
}

fn invalid(message: &str) -> ValidationError {
    ValidationError(message.to_string())
}

fn has_string(value: &Value, pointer: &str) -> bool {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// Validate a `send-message` body (`{event: {...}}`) and extract the event.
pub fn validate_send_message(body: &Value) -> Result<ChatEvent, ValidationError> {
    let event = body
        .get("event")
        .filter(|e| e.is_object())
        .ok_or_else(|| invalid("event is required"))?;

    if !has_string(event, "/eventType") {
        return Err(invalid("event.eventType is required"));
    }
    if !has_string(event, "/sender/type") {
        return Err(invalid("event.sender.type is required"));
    }
    if !has_string(event, "/payload/messageType") {
        return Err(invalid("event.payload.messageType is required"));
    }

    let size = event.to_string().len();
    if size > MAX_EVENT_BYTES {
        tracing::warn!(
            "Event exceeds limit: {} bytes (max: {})",
            size,
            MAX_EVENT_BYTES
        );
        return Err(invalid("event exceeds allowed size"));
    }

    serde_json::from_value(event.clone()).map_err(|e| {
        tracing::debug!(error = %e, "Event failed to deserialize");
        ValidationError(format!("Invalid event: {e}"))
    })
}

/// Validate a `cancel` body and extract the request id.
pub fn validate_cancel(body: &Value) -> Result<String, ValidationError> {
    body.get("requestId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| invalid("requestId is required"))
}
