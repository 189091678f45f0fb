//! In-flight local edits not yet confirmed by a provider.
//!
//! The store maps an event id to the single latest action for that id; a
//! new action for the same id replaces the old one, never appends. Actions
//! are created by the mutation coordinator, read by the projection as
//! snapshots, and removed either on rollback or once a refetch has landed
//! the confirmed data they anticipated.

use std::collections::BTreeMap;
use std::sync::Mutex;

use calsync_core::CalendarEvent;

use crate::scope::QueryScope;

/// One pending local edit, keyed by event id in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimisticAction {
    /// A new event awaiting its server-assigned id.
    Create(CalendarEvent),
    /// A changed version of an existing event.
    Update(CalendarEvent),
    /// An unsaved draft. Never sent to a provider.
    Draft(CalendarEvent),
    /// The event should disappear from the projected view.
    Delete,
}

impl OptimisticAction {
    /// The proposed event, for action kinds that carry one.
    pub fn event(&self) -> Option<&CalendarEvent> {
        match self {
            OptimisticAction::Create(e)
            | OptimisticAction::Update(e)
            | OptimisticAction::Draft(e) => Some(e),
            OptimisticAction::Delete => None,
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, OptimisticAction::Draft(_))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    actions: BTreeMap<String, OptimisticAction>,
    /// Ids whose remote mutation succeeded, keyed to the scope whose
    /// refetch will land the confirmed data. The action stays visible
    /// until that scope commits, then gets swept.
    settled: BTreeMap<String, QueryScope>,
}

/// Session-scoped store of pending optimistic actions.
///
/// Injectable rather than ambient: callers hold a reference and clear it
/// on teardown. Mutations are serialized by the lock; readers always see a
/// complete snapshot, never a partial write.
#[derive(Debug, Default)]
pub struct OptimisticStore {
    inner: Mutex<StoreState>,
}

impl OptimisticStore {
    pub fn new() -> Self {
        OptimisticStore::default()
    }

    /// Record the latest action for `event_id`, replacing any prior one.
    pub fn add(&self, event_id: impl Into<String>, action: OptimisticAction) {
        let event_id = event_id.into();
        let mut state = self.inner.lock().unwrap();
        state.settled.remove(&event_id);
        state.actions.insert(event_id, action);
    }

    pub fn remove(&self, event_id: &str) -> Option<OptimisticAction> {
        let mut state = self.inner.lock().unwrap();
        state.settled.remove(event_id);
        state.actions.remove(event_id)
    }

    /// Replace the action for `event_id` only if it still is `expected`.
    /// A later action for the same id wins over an earlier mutation that
    /// settles late; returns whether the replacement happened.
    pub fn replace_if_current(
        &self,
        event_id: &str,
        expected: &OptimisticAction,
        action: OptimisticAction,
    ) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.actions.get(event_id) != Some(expected) {
            return false;
        }
        state.settled.remove(event_id);
        state.actions.insert(event_id.to_string(), action);
        true
    }

    /// Remove the action for `event_id` only if it still is `expected`.
    pub fn remove_if_current(&self, event_id: &str, expected: &OptimisticAction) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.actions.get(event_id) != Some(expected) {
            return false;
        }
        state.settled.remove(event_id);
        state.actions.remove(event_id);
        true
    }

    /// Drop a pending draft for `event_id`, leaving other action kinds.
    pub fn remove_drafts_for_event(&self, event_id: &str) {
        let mut state = self.inner.lock().unwrap();
        if state.actions.get(event_id).is_some_and(|a| a.is_draft()) {
            state.actions.remove(event_id);
        }
    }

    /// Mark `event_id` as remotely confirmed, remembering the scope whose
    /// refetch supersedes it, only if its action still is `expected`. A
    /// mutation that settles after a newer action replaced its own must
    /// not settle the newer one.
    pub fn settle_if_current(
        &self,
        event_id: &str,
        expected: &OptimisticAction,
        scope: &QueryScope,
    ) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.actions.get(event_id) != Some(expected) {
            return false;
        }
        state.settled.insert(event_id.to_string(), scope.clone());
        true
    }

    /// Remove the settled actions whose scope is among `committed`. Called
    /// once fresh confirmed data has landed for those scopes; settled
    /// actions for other calendars keep their overlay until their own
    /// refetch commits.
    pub fn sweep_settled(&self, committed: &[QueryScope]) {
        let mut state = self.inner.lock().unwrap();
        let swept: Vec<String> = state
            .settled
            .iter()
            .filter(|(_, scope)| committed.contains(scope))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &swept {
            state.settled.remove(id);
            state.actions.remove(id);
        }
        if !swept.is_empty() {
            tracing::debug!(count = swept.len(), "swept settled optimistic actions");
        }
    }

    /// Read-only copy for the projection.
    pub fn snapshot(&self) -> BTreeMap<String, OptimisticAction> {
        self.inner.lock().unwrap().actions.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().actions.is_empty()
    }

    /// Session teardown: forget everything.
    pub fn clear(&self) {
        let mut state = self.inner.lock().unwrap();
        state.actions.clear();
        state.settled.clear();
    }
}
