// Storage layer for the Parley server
// Decision: Trait objects over the core store traits so a persistent backend can slot in
// Decision: In-memory only for now; both stores may be served by one object
//
// - InMemoryDatabase: implements EventStore and RequestStore

pub mod memory;

use std::sync::Arc;

use parley_core::{EventStore, RequestStore};

pub use memory::InMemoryDatabase;

/// Handles to the event log and request stores
#[derive(Clone)]
pub struct Storage {
    pub events: Arc<dyn EventStore>,
    pub requests: Arc<dyn RequestStore>,
}

impl Storage {
    pub fn new(events: Arc<dyn EventStore>, requests: Arc<dyn RequestStore>) -> Self {
        Self { events, requests }
    }

    /// Both stores backed by a single in-memory database
    pub fn in_memory() -> Self {
        let db = Arc::new(InMemoryDatabase::new());
        Self {
            events: db.clone(),
            requests: db,
        }
    }
}
