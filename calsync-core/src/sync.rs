//! Change records produced by the incremental sync protocol.

use serde::{Deserialize, Serialize};

use crate::event::{CalendarEvent, EventIdentity, EventKey};

/// One provider-agnostic change record.
///
/// An update carries the full normalized event; a deletion carries only
/// identity, since the provider reports nothing else for removed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalendarEventSyncItem {
    Updated { event: CalendarEvent },
    Deleted { event: EventIdentity },
}

impl CalendarEventSyncItem {
    pub fn key(&self) -> EventKey {
        match self {
            CalendarEventSyncItem::Updated { event } => event.key(),
            CalendarEventSyncItem::Deleted { event } => event.key(),
        }
    }

    /// The series master this change references, if any.
    pub fn recurring_event_id(&self) -> Option<&str> {
        match self {
            CalendarEventSyncItem::Updated { event } => event.recurring_event_id.as_deref(),
            CalendarEventSyncItem::Deleted { .. } => None,
        }
    }
}

/// Raw result of one delta walk against a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDelta {
    pub changes: Vec<CalendarEventSyncItem>,
    /// The last token seen across pages; absent when the provider emitted
    /// none (callers then keep their stored token).
    pub sync_token: Option<String>,
}

/// Whether a sync was served from the stored token or required a full
/// refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Incremental,
    Full,
}

/// Result of one reconciled sync for a calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub changes: Vec<CalendarEventSyncItem>,
    pub sync_token: Option<String>,
    pub status: SyncStatus,
}
