//! The confirmed event cache.
//!
//! Holds the authoritative local view of events, ordered by start instant.
//! Only confirmed provider data lands here; optimistic state lives in
//! [`crate::optimistic::OptimisticStore`] and is overlaid at read time.
//! A failed sync leaves the cache untouched, stale but consistent.

use std::sync::Mutex;

use calsync_core::{CalendarEvent, CalendarEventSyncItem, EventKey};

use crate::scope::QueryScope;

/// Scope-limited copy of cache contents, taken before a mutation so a
/// rollback can put the scope back exactly as it was.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    scope: QueryScope,
    events: Vec<CalendarEvent>,
}

#[derive(Debug, Default)]
struct CacheState {
    /// Sorted by start instant; ties keep insertion order.
    events: Vec<CalendarEvent>,
}

/// Process-wide confirmed event cache. Single writer at a time; reads copy.
#[derive(Debug, Default)]
pub struct ConfirmedCache {
    inner: Mutex<CacheState>,
}

impl ConfirmedCache {
    pub fn new() -> Self {
        ConfirmedCache::default()
    }

    /// Apply a change list from one sync. Idempotent: updates overwrite by
    /// key, deletions of absent keys are no-ops.
    pub fn apply_changes(&self, changes: &[CalendarEventSyncItem]) {
        let mut state = self.inner.lock().unwrap();
        for change in changes {
            match change {
                CalendarEventSyncItem::Updated { event } => {
                    remove_by_key(&mut state.events, &event.key());
                    insert_sorted(&mut state.events, event.clone());
                }
                CalendarEventSyncItem::Deleted { event } => {
                    remove_by_key(&mut state.events, &event.key());
                }
            }
        }
    }

    /// Replace every cached event in `scope` with `events`.
    pub fn replace_scope(&self, scope: &QueryScope, events: Vec<CalendarEvent>) {
        let mut state = self.inner.lock().unwrap();
        state
            .events
            .retain(|e| !scope.contains(&e.account_id, &e.calendar_id));
        for event in events {
            insert_sorted(&mut state.events, event);
        }
    }

    /// Copy of the cached events in `scope`, in sort order.
    pub fn scope_events(&self, scope: &QueryScope) -> Vec<CalendarEvent> {
        let state = self.inner.lock().unwrap();
        state
            .events
            .iter()
            .filter(|e| scope.contains(&e.account_id, &e.calendar_id))
            .cloned()
            .collect()
    }

    /// Snapshot one scope ahead of a mutation.
    pub fn snapshot(&self, scope: &QueryScope) -> CacheSnapshot {
        CacheSnapshot {
            events: self.scope_events(scope),
            scope: scope.clone(),
        }
    }

    /// Put a scope back as its snapshot recorded it.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        self.replace_scope(&snapshot.scope, snapshot.events);
    }

    /// Full sorted copy of the cache.
    pub fn events(&self) -> Vec<CalendarEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn find(&self, scope: &QueryScope, event_id: &str) -> Option<CalendarEvent> {
        let state = self.inner.lock().unwrap();
        state
            .events
            .iter()
            .find(|e| e.id == event_id && scope.contains(&e.account_id, &e.calendar_id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().events.clear();
    }
}

fn remove_by_key(events: &mut Vec<CalendarEvent>, key: &EventKey) {
    events.retain(|e| e.key() != *key);
}

/// Insert keeping the start-instant order; equal starts go after existing
/// entries, so repeated application stays order-stable.
fn insert_sorted(events: &mut Vec<CalendarEvent>, event: CalendarEvent) {
    let start = event.start_utc();
    let at = events.partition_point(|e| e.start_utc() <= start);
    events.insert(at, event);
}
