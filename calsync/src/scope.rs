//! Query scopes, fetch cancellation, and cache invalidation hooks.
//!
//! A scope names the (account, calendar) pair a fetch or mutation touches.
//! Cancellation is epoch-based: starting a fetch records the scope's current
//! epoch in a ticket, and a mutation cancels in-flight fetches by bumping
//! the epoch. A fetch whose ticket no longer matches commits nothing; the
//! late response is discarded, not suppressed.

use std::collections::HashMap;
use std::sync::Mutex;

use calsync_core::Calendar;

/// The (account, calendar) pair a fetch or mutation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryScope {
    pub account_id: String,
    pub calendar_id: String,
}

impl QueryScope {
    pub fn new(account_id: impl Into<String>, calendar_id: impl Into<String>) -> Self {
        QueryScope {
            account_id: account_id.into(),
            calendar_id: calendar_id.into(),
        }
    }

    pub fn of(calendar: &Calendar) -> Self {
        QueryScope {
            account_id: calendar.account_id.clone(),
            calendar_id: calendar.id.clone(),
        }
    }

    /// Whether an event with these coordinates falls inside this scope.
    pub fn contains(&self, account_id: &str, calendar_id: &str) -> bool {
        self.account_id == account_id && self.calendar_id == calendar_id
    }
}

/// Proof that a fetch started at a particular scope epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub scope: QueryScope,
    epoch: u64,
}

/// Tracks the cancellation epoch of every scope with fetch activity.
#[derive(Debug, Default)]
pub struct FetchRegistry {
    epochs: Mutex<HashMap<QueryScope, u64>>,
}

impl FetchRegistry {
    pub fn new() -> Self {
        FetchRegistry::default()
    }

    /// Record the start of a fetch for `scope`.
    pub fn begin(&self, scope: QueryScope) -> FetchTicket {
        let epochs = self.epochs.lock().unwrap();
        let epoch = epochs.get(&scope).copied().unwrap_or(0);
        FetchTicket { scope, epoch }
    }

    /// Invalidate every in-flight ticket for `scope`.
    pub fn cancel(&self, scope: &QueryScope) {
        let mut epochs = self.epochs.lock().unwrap();
        *epochs.entry(scope.clone()).or_insert(0) += 1;
        tracing::debug!(
            account = %scope.account_id,
            calendar = %scope.calendar_id,
            "cancelled in-flight fetches"
        );
    }

    /// Whether a result fetched under `ticket` may still be committed.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        let epochs = self.epochs.lock().unwrap();
        epochs.get(&ticket.scope).copied().unwrap_or(0) == ticket.epoch
    }
}

/// Post-commit invalidation hook.
///
/// The mutation coordinator calls this after a confirmed remote write; the
/// external cache layer translates the scope into whatever refetch it runs.
pub trait Invalidator: Send + Sync {
    fn invalidate(&self, scope: &QueryScope);
}

/// Invalidator for callers that drive refetches themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInvalidator;

impl Invalidator for NullInvalidator {
    fn invalidate(&self, _scope: &QueryScope) {}
}
