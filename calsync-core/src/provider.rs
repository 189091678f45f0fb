//! The provider capability surface.
//!
//! Each provider crate implements `CalendarClient` once. The engine wraps
//! the implementations in a closed enum and dispatches by tag, so adding a
//! provider is a compile-time-checked addition of one variant.

use std::fmt;

use async_trait::async_trait;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::Calendar;
use crate::date_range::DateRange;
use crate::error::SyncResult;
use crate::event::{CalendarEvent, EventInput, ParticipationStatus};
use crate::freebusy::CalendarFreeBusy;
use crate::sync::SyncDelta;

/// Which provider an account, calendar, or event belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    Microsoft,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::Google => write!(f, "google"),
            ProviderId::Microsoft => write!(f, "microsoft"),
        }
    }
}

/// The events fetched for one calendar and time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<CalendarEvent>,
    /// Master series events referenced by `recurring_event_id` in `events`.
    pub recurring_masters: Vec<CalendarEvent>,
}

/// One remote calendar account.
///
/// Every method classifies and wraps its own failures through
/// [`crate::error::ErrorContext`]; nothing is swallowed. Time values cross
/// this boundary as normalized [`crate::event::EventTime`]s; translating
/// them to each provider's wire format is the implementation's concern.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    fn provider(&self) -> ProviderId;

    /// Engine-side account identifier this client serves.
    fn account_id(&self) -> &str;

    async fn list_calendars(&self) -> SyncResult<Vec<Calendar>>;

    /// Fetch events in `range`, expanded per-instance, plus the master
    /// events for any recurring instances in the window.
    async fn list_events(
        &self,
        calendar: &Calendar,
        range: &DateRange,
        time_zone: Tz,
    ) -> SyncResult<EventPage>;

    /// One paginated delta walk. With a token, fetches changes since that
    /// token; without one, a full fetch of `range`. Fails with
    /// `SyncError::SyncTokenExpired` when the provider rejects the token;
    /// the reconciler owns the full-resync retry.
    async fn sync(
        &self,
        calendar: &Calendar,
        sync_token: Option<&str>,
        range: Option<&DateRange>,
        time_zone: Tz,
    ) -> SyncResult<SyncDelta>;

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> SyncResult<CalendarEvent>;

    async fn create_event(
        &self,
        calendar: &Calendar,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent>;

    async fn update_event(
        &self,
        calendar: &Calendar,
        event_id: &str,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent>;

    async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<()>;

    /// Move an event between calendars, preserving its identity where the
    /// provider allows it.
    async fn move_event(
        &self,
        source: &Calendar,
        dest: &Calendar,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<CalendarEvent>;

    async fn respond_to_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        response: ParticipationStatus,
    ) -> SyncResult<()>;

    async fn free_busy(
        &self,
        schedule_ids: &[String],
        range: &DateRange,
    ) -> SyncResult<Vec<CalendarFreeBusy>>;
}
