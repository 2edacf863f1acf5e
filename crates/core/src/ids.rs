// Identifier generation
//
// Ids are UUID v7 (time-ordered) with a short type prefix so they stay
// readable in logs and on the wire. Client-supplied ids (fixtures) are kept
// verbatim, so ids are plain strings everywhere.

use uuid::Uuid;

pub const EVENT_ID_PREFIX: &str = "evt_";
pub const REQUEST_ID_PREFIX: &str = "req_";
pub const MESSAGE_ID_PREFIX: &str = "msg_";

pub fn new_event_id() -> String {
    format!("{}{}", EVENT_ID_PREFIX, Uuid::now_v7().simple())
}

pub fn new_request_id() -> String {
    format!("{}{}", REQUEST_ID_PREFIX, Uuid::now_v7().simple())
}

pub fn new_message_id() -> String {
    format!("{}{}", MESSAGE_ID_PREFIX, Uuid::now_v7().simple())
}
