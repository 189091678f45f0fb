//! The mutation coordinator.
//!
//! One create/update/delete/move/respond attempt runs a small state
//! machine: Pending, then Committed or RolledBack. Entering Pending cancels
//! in-flight fetches for the affected scopes, snapshots the confirmed
//! cache, and writes the optimistic action; the remote call then decides
//! which exit arm runs. On commit the action stays in place, marked
//! settled, until a refetch of its own calendar lands the confirmed data
//! and sweeps it; on
//! rollback the action is removed and the snapshot restored, so the
//! projected view returns to exactly its pre-mutation state.
//!
//! Per-id ordering: a mutation only touches the store entry it wrote. When
//! a newer action has replaced it in the meantime, the newer action wins
//! and the settling mutation leaves it alone.

use calsync_core::{
    Calendar, CalendarClient, CalendarEvent, EventInput, ParticipationStatus, SyncError,
    SyncResult,
};
use uuid::Uuid;

use crate::cache::{CacheSnapshot, ConfirmedCache};
use crate::optimistic::{OptimisticAction, OptimisticStore};
use crate::scope::{FetchRegistry, Invalidator, QueryScope};

/// Coordinates optimistic mutations against one provider account.
pub struct MutationCoordinator<'a, C: CalendarClient + ?Sized> {
    client: &'a C,
    cache: &'a ConfirmedCache,
    store: &'a OptimisticStore,
    fetches: &'a FetchRegistry,
    invalidator: &'a dyn Invalidator,
}

impl<C: CalendarClient + ?Sized> std::fmt::Debug for MutationCoordinator<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator").finish_non_exhaustive()
    }
}

impl<'a, C: CalendarClient + ?Sized> MutationCoordinator<'a, C> {
    pub fn new(
        client: &'a C,
        cache: &'a ConfirmedCache,
        store: &'a OptimisticStore,
        fetches: &'a FetchRegistry,
        invalidator: &'a dyn Invalidator,
    ) -> Self {
        MutationCoordinator {
            client,
            cache,
            store,
            fetches,
            invalidator,
        }
    }

    /// Create an event. The projection shows it immediately under a local
    /// placeholder id; on confirmation the action is re-keyed under the
    /// server-assigned id so the next refetch supersedes it cleanly.
    pub async fn create_event(
        &self,
        calendar: &Calendar,
        input: EventInput,
    ) -> SyncResult<CalendarEvent> {
        let scope = QueryScope::of(calendar);
        self.fetches.cancel(&scope);
        let snapshot = self.cache.snapshot(&scope);

        let placeholder_id = format!("local-{}", Uuid::new_v4());
        let pending =
            OptimisticAction::Create(input.clone().into_event(placeholder_id.clone(), calendar));
        self.store.add(&placeholder_id, pending.clone());
        tracing::debug!(calendar = %calendar.id, id = %placeholder_id, "mutation pending: create");

        match self.client.create_event(calendar, &input).await {
            Ok(created) => {
                self.store.remove_if_current(&placeholder_id, &pending);
                let confirmed = OptimisticAction::Create(created.clone());
                self.store.add(&created.id, confirmed.clone());
                self.store.settle_if_current(&created.id, &confirmed, &scope);
                self.commit(&created.id, &[&scope]);
                Ok(created)
            }
            Err(err) => {
                self.rollback(&placeholder_id, &pending, snapshot, &err);
                Err(err)
            }
        }
    }

    /// Update an event in place.
    pub async fn update_event(
        &self,
        calendar: &Calendar,
        event_id: &str,
        input: EventInput,
    ) -> SyncResult<CalendarEvent> {
        let scope = QueryScope::of(calendar);
        self.fetches.cancel(&scope);
        let snapshot = self.cache.snapshot(&scope);

        let proposed = match self.cache.find(&scope, event_id) {
            Some(existing) => input.apply_to(&existing),
            None => input.clone().into_event(event_id.to_string(), calendar),
        };
        let pending = OptimisticAction::Update(proposed);
        self.store.add(event_id, pending.clone());
        tracing::debug!(calendar = %calendar.id, id = event_id, "mutation pending: update");

        match self.client.update_event(calendar, event_id, &input).await {
            Ok(updated) => {
                let confirmed = OptimisticAction::Update(updated.clone());
                if self
                    .store
                    .replace_if_current(event_id, &pending, confirmed.clone())
                {
                    self.store.settle_if_current(event_id, &confirmed, &scope);
                }
                self.commit(event_id, &[&scope]);
                Ok(updated)
            }
            Err(err) => {
                self.rollback(event_id, &pending, snapshot, &err);
                Err(err)
            }
        }
    }

    /// Delete an event. A remote "already gone" counts as success: the
    /// optimistic removal was correct.
    pub async fn delete_event(
        &self,
        calendar: &Calendar,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<()> {
        let scope = QueryScope::of(calendar);
        self.fetches.cancel(&scope);
        let snapshot = self.cache.snapshot(&scope);

        self.store.add(event_id, OptimisticAction::Delete);
        tracing::debug!(calendar = %calendar.id, id = event_id, "mutation pending: delete");

        match self
            .client
            .delete_event(&calendar.id, event_id, notify_attendees)
            .await
        {
            Ok(()) => {
                self.store
                    .settle_if_current(event_id, &OptimisticAction::Delete, &scope);
                self.commit(event_id, &[&scope]);
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!(id = event_id, "event already gone remotely, treating as deleted");
                self.store
                    .settle_if_current(event_id, &OptimisticAction::Delete, &scope);
                self.commit(event_id, &[&scope]);
                Ok(())
            }
            Err(err) => {
                self.rollback(event_id, &OptimisticAction::Delete, snapshot, &err);
                Err(err)
            }
        }
    }

    /// Move an event between calendars. The overlay rewrites the calendar
    /// and account coordinates on the one existing identity; the event is
    /// never shown as a delete plus a create.
    pub async fn move_event(
        &self,
        source: &Calendar,
        dest: &Calendar,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<CalendarEvent> {
        let source_scope = QueryScope::of(source);
        let dest_scope = QueryScope::of(dest);
        self.fetches.cancel(&source_scope);
        self.fetches.cancel(&dest_scope);
        let snapshot = self.cache.snapshot(&source_scope);

        let pending = self.cache.find(&source_scope, event_id).map(|existing| {
            let mut moved = existing;
            moved.calendar_id = dest.id.clone();
            moved.account_id = dest.account_id.clone();
            moved.provider_account_id = dest.provider_account_id.clone();
            let action = OptimisticAction::Update(moved);
            self.store.add(event_id, action.clone());
            action
        });
        tracing::debug!(
            from = %source.id,
            to = %dest.id,
            id = event_id,
            "mutation pending: move"
        );

        match self
            .client
            .move_event(source, dest, event_id, notify_attendees)
            .await
        {
            Ok(moved) => {
                let confirmed = OptimisticAction::Update(moved.clone());
                let current = match &pending {
                    Some(pending) => {
                        self.store
                            .replace_if_current(event_id, pending, confirmed.clone())
                    }
                    None => {
                        self.store.add(event_id, confirmed.clone());
                        true
                    }
                };
                // The moved event now lives in the destination calendar, so
                // that scope's refetch is the one that supersedes it.
                if current {
                    self.store
                        .settle_if_current(event_id, &confirmed, &dest_scope);
                }
                self.commit(event_id, &[&source_scope, &dest_scope]);
                Ok(moved)
            }
            Err(err) => {
                if let Some(pending) = &pending {
                    self.store.remove_if_current(event_id, pending);
                }
                self.cache.restore(snapshot);
                tracing::warn!(id = event_id, error = %err, "mutation rolled back");
                Err(err)
            }
        }
    }

    /// Answer an invitation. The overlay flips the cached event's own
    /// response status while the provider call is in flight.
    pub async fn respond_to_event(
        &self,
        calendar: &Calendar,
        event_id: &str,
        response: ParticipationStatus,
    ) -> SyncResult<()> {
        let scope = QueryScope::of(calendar);
        self.fetches.cancel(&scope);
        let snapshot = self.cache.snapshot(&scope);

        let pending = self.cache.find(&scope, event_id).map(|existing| {
            let mut answered = existing;
            answered.response_status = Some(response);
            let action = OptimisticAction::Update(answered);
            self.store.add(event_id, action.clone());
            action
        });
        tracing::debug!(calendar = %calendar.id, id = event_id, "mutation pending: respond");

        match self
            .client
            .respond_to_event(&calendar.id, event_id, response)
            .await
        {
            Ok(()) => {
                if let Some(pending) = &pending {
                    self.store.settle_if_current(event_id, pending, &scope);
                }
                self.commit(event_id, &[&scope]);
                Ok(())
            }
            Err(err) => {
                if let Some(pending) = &pending {
                    self.store.remove_if_current(event_id, pending);
                }
                self.cache.restore(snapshot);
                tracing::warn!(id = event_id, error = %err, "mutation rolled back");
                Err(err)
            }
        }
    }

    /// Stash an unsaved draft in the overlay. Purely local.
    pub fn save_draft(&self, calendar: &Calendar, event_id: &str, input: EventInput) {
        let scope = QueryScope::of(calendar);
        let proposed = match self.cache.find(&scope, event_id) {
            Some(existing) => input.apply_to(&existing),
            None => input.into_event(event_id.to_string(), calendar),
        };
        self.store.add(event_id, OptimisticAction::Draft(proposed));
    }

    pub fn discard_draft(&self, event_id: &str) {
        self.store.remove_drafts_for_event(event_id);
    }

    /// Drop the action for `event_id` right away instead of waiting for
    /// the post-commit refetch to supersede it.
    pub fn complete(&self, event_id: &str) {
        self.store.remove(event_id);
    }

    fn commit(&self, event_id: &str, scopes: &[&QueryScope]) {
        for scope in scopes {
            self.invalidator.invalidate(scope);
        }
        tracing::debug!(id = event_id, "mutation committed");
    }

    fn rollback(
        &self,
        event_id: &str,
        pending: &OptimisticAction,
        snapshot: CacheSnapshot,
        err: &SyncError,
    ) {
        self.store.remove_if_current(event_id, pending);
        self.cache.restore(snapshot);
        tracing::warn!(id = event_id, error = %err, "mutation rolled back");
    }
}
