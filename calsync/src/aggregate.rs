//! Cross-provider aggregation.
//!
//! Merges the per-calendar event pages fetched for one time window into a
//! single globally ordered list. Runs from scratch on every list request;
//! the per-calendar fetch cap bounds the input size, so correctness wins
//! over incrementality.

use std::collections::HashMap;

use calsync_core::{CalendarEvent, EventPage};

/// The merged view across every fetched calendar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedEvents {
    /// All events, ordered by UTC start instant; equal starts keep the
    /// page/provider order they arrived in.
    pub events: Vec<CalendarEvent>,
    /// Series masters by event id, merged across accounts. When two
    /// accounts disagree about a master, the later page wins.
    pub recurring_masters: HashMap<String, CalendarEvent>,
}

/// Merge `pages` into one sorted list plus a deduplicated master map.
/// Deterministic: the same input pages in the same order always produce
/// the same output.
pub fn aggregate(pages: Vec<EventPage>) -> AggregatedEvents {
    let mut events = Vec::new();
    let mut recurring_masters = HashMap::new();

    for page in pages {
        events.extend(page.events);
        for master in page.recurring_masters {
            recurring_masters.insert(master.id.clone(), master);
        }
    }

    // Stable sort: ties keep arrival order, which makes reruns identical.
    events.sort_by_key(CalendarEvent::start_utc);

    AggregatedEvents {
        events,
        recurring_masters,
    }
}
