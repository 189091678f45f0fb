//! The engine facade.
//!
//! Owns the client map, the confirmed cache, the optimistic store, and the
//! fetch registry, and exposes the two read surfaces: list events across
//! calendars for a window, and sync one calendar since a token. Both are
//! caller-triggered; the engine never polls.

use std::collections::HashMap;
use std::sync::Arc;

use calsync_core::{
    Calendar, CalendarClient, CalendarEvent, CalendarFreeBusy, DateRange, EventPage, SyncError,
    SyncOutcome, SyncResult,
};
use chrono_tz::Tz;
use futures::future::try_join_all;

use crate::aggregate::aggregate;
use crate::cache::ConfirmedCache;
use crate::client::ProviderClient;
use crate::config::EngineConfig;
use crate::mutation::MutationCoordinator;
use crate::optimistic::OptimisticStore;
use crate::projection;
use crate::scope::{FetchRegistry, Invalidator, NullInvalidator, QueryScope};

/// The merged, optimistic-projected result of one list request.
#[derive(Debug, Clone, Default)]
pub struct ListedEvents {
    pub events: Vec<CalendarEvent>,
    pub recurring_masters: HashMap<String, CalendarEvent>,
}

/// One session's sync engine over a set of connected accounts.
pub struct SyncEngine<C: CalendarClient> {
    clients: HashMap<String, C>,
    cache: ConfirmedCache,
    store: OptimisticStore,
    fetches: FetchRegistry,
    invalidator: Arc<dyn Invalidator>,
}

impl SyncEngine<ProviderClient> {
    /// Connect every account in `config`.
    pub fn from_config(config: EngineConfig) -> SyncResult<Self> {
        let mut clients = HashMap::new();
        for account in config.accounts {
            let client = ProviderClient::connect(account)?;
            clients.insert(client.account_id().to_string(), client);
        }
        Ok(SyncEngine::new(clients))
    }
}

impl<C: CalendarClient> SyncEngine<C> {
    pub fn new(clients: HashMap<String, C>) -> Self {
        SyncEngine {
            clients,
            cache: ConfirmedCache::new(),
            store: OptimisticStore::new(),
            fetches: FetchRegistry::new(),
            invalidator: Arc::new(NullInvalidator),
        }
    }

    /// Route post-commit invalidations to an external cache layer.
    pub fn with_invalidator(mut self, invalidator: Arc<dyn Invalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    fn client_for(&self, account_id: &str) -> SyncResult<&C> {
        self.clients
            .get(account_id)
            .ok_or_else(|| SyncError::Config(format!("no client for account {account_id}")))
    }

    /// Calendars across every connected account.
    pub async fn list_calendars(&self) -> SyncResult<Vec<Calendar>> {
        let fetched =
            try_join_all(self.clients.values().map(|c| c.list_calendars())).await?;
        let mut calendars: Vec<Calendar> = fetched.into_iter().flatten().collect();
        calendars.sort_by(|a, b| {
            (&a.account_id, &a.id).cmp(&(&b.account_id, &b.id))
        });
        Ok(calendars)
    }

    /// Fetch `calendars` for `range` concurrently, commit the results into
    /// the confirmed cache, and return the merged, optimistic-projected
    /// view. Results for a scope whose fetch was cancelled mid-flight are
    /// discarded; the previously confirmed data stands in for them.
    pub async fn list_events(
        &self,
        calendars: &[Calendar],
        range: &DateRange,
        time_zone: Tz,
    ) -> SyncResult<ListedEvents> {
        let mut fetches = Vec::with_capacity(calendars.len());
        for calendar in calendars {
            let client = self.client_for(&calendar.account_id)?;
            let ticket = self.fetches.begin(QueryScope::of(calendar));
            fetches.push(async move {
                let page = client.list_events(calendar, range, time_zone).await?;
                Ok::<_, SyncError>((ticket, page))
            });
        }
        // Partial results are never merged; one failed calendar fails the
        // whole request and the cache keeps its previous state.
        let results = try_join_all(fetches).await?;

        let mut committed = Vec::new();
        for (ticket, page) in &results {
            if self.fetches.is_current(ticket) {
                self.cache.replace_scope(&ticket.scope, page.events.clone());
                committed.push(ticket.scope.clone());
            } else {
                tracing::debug!(
                    account = %ticket.scope.account_id,
                    calendar = %ticket.scope.calendar_id,
                    "discarding cancelled fetch result"
                );
            }
        }
        // Settled actions are only superseded by a refetch of their own
        // calendar; a commit for another scope leaves them overlaid.
        if !committed.is_empty() {
            self.store.sweep_settled(&committed);
        }

        // Display data always comes from the cache, so cancelled scopes
        // contribute their previous confirmed events.
        let pages: Vec<EventPage> = results
            .into_iter()
            .map(|(ticket, page)| EventPage {
                events: self.cache.scope_events(&ticket.scope),
                recurring_masters: if self.fetches.is_current(&ticket) {
                    page.recurring_masters
                } else {
                    Vec::new()
                },
            })
            .collect();
        let merged = aggregate(pages);

        Ok(ListedEvents {
            events: projection::apply(&merged.events, &self.store.snapshot()),
            recurring_masters: merged.recurring_masters,
        })
    }

    /// Sync one calendar since `stored_token` and fold the changes into
    /// the confirmed cache, unless the fetch was cancelled mid-flight.
    pub async fn sync_calendar(
        &self,
        calendar: &Calendar,
        stored_token: Option<&str>,
        range: Option<&DateRange>,
        time_zone: Tz,
    ) -> SyncResult<SyncOutcome> {
        let client = self.client_for(&calendar.account_id)?;
        let ticket = self.fetches.begin(QueryScope::of(calendar));

        let outcome =
            crate::reconcile::sync_calendar(client, calendar, stored_token, range, time_zone)
                .await?;

        if self.fetches.is_current(&ticket) {
            self.cache.apply_changes(&outcome.changes);
            self.store
                .sweep_settled(std::slice::from_ref(&ticket.scope));
        } else {
            tracing::debug!(
                account = %calendar.account_id,
                calendar = %calendar.id,
                "discarding cancelled sync result"
            );
        }
        Ok(outcome)
    }

    /// Free/busy intervals for one account's schedules.
    pub async fn free_busy(
        &self,
        account_id: &str,
        schedule_ids: &[String],
        range: &DateRange,
    ) -> SyncResult<Vec<CalendarFreeBusy>> {
        self.client_for(account_id)?
            .free_busy(schedule_ids, range)
            .await
    }

    /// A mutation coordinator bound to one account's client.
    pub fn coordinator(&self, account_id: &str) -> SyncResult<MutationCoordinator<'_, C>> {
        let client = self.client_for(account_id)?;
        Ok(MutationCoordinator::new(
            client,
            &self.cache,
            &self.store,
            &self.fetches,
            self.invalidator.as_ref(),
        ))
    }

    /// The full confirmed cache with pending actions overlaid.
    pub fn projected_events(&self) -> Vec<CalendarEvent> {
        projection::apply(&self.cache.events(), &self.store.snapshot())
    }

    pub fn cache(&self) -> &ConfirmedCache {
        &self.cache
    }

    pub fn store(&self) -> &OptimisticStore {
        &self.store
    }

    /// Session teardown: drop all cached and pending state.
    pub fn clear(&self) {
        self.cache.clear();
        self.store.clear();
    }
}
