//! The sync reconciler.
//!
//! Owns the per-calendar incremental fetch: one delta walk through the
//! provider client, one automatic full-resync retry when the stored token
//! has expired, and the Google-only secondary fetch that resolves series
//! master references. Token expiry never reaches the caller.

use calsync_core::{
    Calendar, CalendarClient, CalendarEventSyncItem, DateRange, ProviderId, SyncOutcome,
    SyncResult, SyncStatus,
};
use chrono_tz::Tz;

/// Run one reconciled sync for `calendar`.
///
/// With a stored token the result is [`SyncStatus::Incremental`]; without
/// one, or after the provider rejects the token, the walk restarts from
/// scratch and the result is [`SyncStatus::Full`].
pub async fn sync_calendar<C>(
    client: &C,
    calendar: &Calendar,
    stored_token: Option<&str>,
    range: Option<&DateRange>,
    time_zone: Tz,
) -> SyncResult<SyncOutcome>
where
    C: CalendarClient + ?Sized,
{
    let (delta, status) = match stored_token {
        None => (
            client.sync(calendar, None, range, time_zone).await?,
            SyncStatus::Full,
        ),
        Some(token) => match client.sync(calendar, Some(token), range, time_zone).await {
            Ok(delta) => (delta, SyncStatus::Incremental),
            Err(err) if err.is_token_expired() => {
                tracing::info!(
                    account = %calendar.account_id,
                    calendar = %calendar.id,
                    "sync token expired, falling back to full resync"
                );
                (
                    client.sync(calendar, None, range, time_zone).await?,
                    SyncStatus::Full,
                )
            }
            Err(err) => return Err(err),
        },
    };

    let mut changes = delta.changes;
    if client.provider() == ProviderId::Google {
        expand_series_masters(client, calendar, &mut changes).await?;
    }

    tracing::debug!(
        account = %calendar.account_id,
        calendar = %calendar.id,
        changes = changes.len(),
        status = ?status,
        "sync reconciled"
    );
    Ok(SyncOutcome {
        changes,
        sync_token: delta.sync_token,
        status,
    })
}

/// Fetch the masters referenced by recurring instances in `changes` and
/// fold them into the change list as updates. Google deltas carry series
/// instances without their masters; Graph deltas arrive per-instance and
/// never need this.
async fn expand_series_masters<C>(
    client: &C,
    calendar: &Calendar,
    changes: &mut Vec<CalendarEventSyncItem>,
) -> SyncResult<()>
where
    C: CalendarClient + ?Sized,
{
    let mut master_ids: Vec<String> = changes
        .iter()
        .filter_map(|c| c.recurring_event_id())
        .map(str::to_string)
        .collect();
    master_ids.sort_unstable();
    master_ids.dedup();
    master_ids.retain(|id| {
        !changes.iter().any(|c| match c {
            CalendarEventSyncItem::Updated { event } => event.id == *id,
            CalendarEventSyncItem::Deleted { event } => event.id == *id,
        })
    });

    for id in master_ids {
        match client.get_event(&calendar.id, &id).await {
            Ok(master) => changes.push(CalendarEventSyncItem::Updated { event: master }),
            Err(err) if err.is_not_found() => {
                tracing::warn!(calendar = %calendar.id, master = %id, "series master missing");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
