// History selection
//
// Pure range selection over a conversation's visible events (append order,
// cancelled triggering events already filtered out). Four mutually exclusive
// modes; when several are supplied the precedence is
// last > before > after > page.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

use crate::event::StoredEvent;

/// Page size used by `before` when none is given.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default cap on `after` results.
pub const DEFAULT_AFTER_CAP: usize = 500;

/// A history selection mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryQuery {
    /// Everything, `has_more = false`.
    #[default]
    All,
    /// The final `n` events.
    Last(usize),
    /// Events strictly before `cursor`, most recent `page_size` of them.
    Before { cursor: String, page_size: usize },
    /// Every event strictly after `cursor` (catch-up / backfill).
    After { cursor: String },
    /// Offset pagination.
    Page { page: usize, page_size: usize },
}

/// Result of a selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistorySlice {
    pub events: Vec<StoredEvent>,
    pub has_more: bool,
}

impl HistorySlice {
    fn new(events: Vec<StoredEvent>, has_more: bool) -> Self {
        Self { events, has_more }
    }
}

/// Select from `events` according to `query`.
///
/// `after_cap` bounds the `After` mode; truncated results report
/// `has_more = true` and keep the oldest events so the caller can continue
/// from the last returned id.
pub fn select(events: &[StoredEvent], query: &HistoryQuery, after_cap: usize) -> HistorySlice {
    match query {
        HistoryQuery::All => HistorySlice::new(events.to_vec(), false),

        HistoryQuery::Last(n) => {
            let start = events.len().saturating_sub(*n);
            HistorySlice::new(events[start..].to_vec(), events.len() > *n)
        }

        HistoryQuery::Before { cursor, page_size } => {
            let idx = match position(events, cursor) {
                Some(idx) if idx > 0 => idx,
                _ => return HistorySlice::default(),
            };
            let preceding = &events[..idx];
            let start = preceding.len().saturating_sub(*page_size);
            HistorySlice::new(preceding[start..].to_vec(), preceding.len() > *page_size)
        }

        HistoryQuery::After { cursor } => {
            // Unknown cursor: hand back everything so the caller can resync.
            let rest = match position(events, cursor) {
                Some(idx) => &events[idx + 1..],
                None => events,
            };
            if rest.len() > after_cap {
                HistorySlice::new(rest[..after_cap].to_vec(), true)
            } else {
                HistorySlice::new(rest.to_vec(), false)
            }
        }

        HistoryQuery::Page { page, page_size } => {
            let start = page.saturating_mul(*page_size).min(events.len());
            // One extra to learn whether another page exists.
            let end = start
                .saturating_add(*page_size)
                .saturating_add(1)
                .min(events.len());
            let mut window = events[start..end].to_vec();
            let has_more = window.len() > *page_size;
            window.truncate(*page_size);
            HistorySlice::new(window, has_more)
        }
    }
}

fn position(events: &[StoredEvent], cursor: &str) -> Option<usize> {
    events.iter().position(|e| e.event_id == cursor)
}

/// Wire form of a history query (`get-history` query string).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema, IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct HistoryParams {
    #[serde(
        rename = "conversationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<usize>,
}

impl HistoryParams {
    /// Build the wire form for `query` on `conversation_id`.
    pub fn for_query(conversation_id: impl Into<String>, query: &HistoryQuery) -> Self {
        let mut params = Self {
            conversation_id: Some(conversation_id.into()),
            ..Self::default()
        };
        match query {
            HistoryQuery::All => {}
            HistoryQuery::Last(n) => params.last = Some(*n),
            HistoryQuery::Before { cursor, page_size } => {
                params.messages_before = Some(cursor.clone());
                params.page_size = Some(*page_size);
            }
            HistoryQuery::After { cursor } => params.messages_after = Some(cursor.clone()),
            HistoryQuery::Page { page, page_size } => {
                params.page = Some(*page);
                params.page_size = Some(*page_size);
            }
        }
        params
    }

    /// Resolve the selection mode. Empty cursors are treated as absent.
    pub fn to_query(&self) -> HistoryQuery {
        let non_empty = |s: &Option<String>| s.as_ref().filter(|s| !s.is_empty()).cloned();

        if let Some(n) = self.last {
            return HistoryQuery::Last(n);
        }
        if let Some(cursor) = non_empty(&self.messages_before) {
            return HistoryQuery::Before {
                cursor,
                page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            };
        }
        if let Some(cursor) = non_empty(&self.messages_after) {
            return HistoryQuery::After { cursor };
        }
        if let (Some(page), Some(page_size)) = (self.page, self.page_size) {
            return HistoryQuery::Page { page, page_size };
        }
        HistoryQuery::All
    }
}
