// Client-side conversation timeline
//
// Events arrive from three places (stream push, missed-message polling and
// history sync/pagination). Every path goes through the seen-id set, so an
// event id is never added twice no matter which channel delivered it first.
//
// Optimistic entries carry a `pending-N` id until the server acknowledges
// them; pending ids are never recorded as seen.

use std::collections::HashSet;

use chrono::Utc;
use parley_core::{ChatEvent, StoredEvent};

const PENDING_PREFIX: &str = "pending-";

#[derive(Debug, Default)]
pub struct Timeline {
    events: Vec<StoredEvent>,
    seen: HashSet<String>,
    next_pending: u64,
}

impl Timeline {
    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_seen(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    /// Replace everything with a freshly loaded page.
    pub fn reset(&mut self, events: Vec<StoredEvent>) {
        self.seen = events.iter().map(|e| e.event_id.clone()).collect();
        self.events = events;
    }

    /// Append one event unless already seen.
    pub fn push(&mut self, event: StoredEvent) -> bool {
        if !self.seen.insert(event.event_id.clone()) {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Append the unseen events in order, returning what was added.
    pub fn extend(&mut self, events: Vec<StoredEvent>) -> Vec<StoredEvent> {
        let mut added = Vec::new();
        for event in events {
            if self.seen.insert(event.event_id.clone()) {
                self.events.push(event.clone());
                added.push(event);
            }
        }
        added
    }

    /// Put an older page in front of the timeline.
    pub fn prepend(&mut self, events: Vec<StoredEvent>) -> usize {
        let older: Vec<StoredEvent> = events
            .into_iter()
            .filter(|e| self.seen.insert(e.event_id.clone()))
            .collect();
        let count = older.len();
        if count > 0 {
            self.events.splice(0..0, older);
        }
        count
    }

    /// Merge a sync window: add unseen events, then restore `createdAt` order.
    pub fn merge_sorted(&mut self, events: Vec<StoredEvent>) -> Vec<StoredEvent> {
        let added = self.extend(events);
        if !added.is_empty() {
            // Stable, so events sharing a timestamp keep their arrival order.
            self.events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        added
    }

    /// Show a submitted event before the server has acknowledged it.
    pub fn insert_pending(&mut self, event: ChatEvent) -> String {
        self.next_pending += 1;
        let temp_id = format!("{}{}", PENDING_PREFIX, self.next_pending);
        let conversation_id = event.conversation_id.clone().unwrap_or_default();
        self.events
            .push(event.into_stored(temp_id.clone(), conversation_id, Utc::now()));
        temp_id
    }

    /// Swap a pending id for the durable one.
    pub fn confirm_pending(&mut self, temp_id: &str, event_id: &str) {
        if !self.seen.insert(event_id.to_string()) {
            // Already delivered under its durable id.
            self.discard_pending(temp_id);
            return;
        }
        if let Some(entry) = self.events.iter_mut().find(|e| e.event_id == temp_id) {
            entry.event_id = event_id.to_string();
        }
    }

    /// Roll back an optimistic entry.
    pub fn discard_pending(&mut self, temp_id: &str) {
        self.events.retain(|e| e.event_id != temp_id);
    }

    /// Oldest durable id, the cursor for loading earlier history.
    pub fn oldest_id(&self) -> Option<&str> {
        self.events
            .iter()
            .map(|e| e.event_id.as_str())
            .find(|id| !is_pending(id))
    }
}

pub fn is_pending(event_id: &str) -> bool {
    event_id.starts_with(PENDING_PREFIX)
}
