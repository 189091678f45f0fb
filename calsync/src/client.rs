//! Closed provider dispatch.
//!
//! Every supported provider is one variant here. Dispatch is by explicit
//! tag; adding a provider means adding a variant and letting the compiler
//! point at every match that needs it.

use async_trait::async_trait;
use calsync_core::{
    Calendar, CalendarClient, CalendarEvent, CalendarFreeBusy, DateRange, EventInput, EventPage,
    ParticipationStatus, ProviderId, SyncDelta, SyncResult,
};
use calsync_provider_google::GoogleClient;
use calsync_provider_outlook::OutlookClient;
use chrono_tz::Tz;

use crate::config::AccountConfig;

/// A connected provider account.
#[derive(Debug, Clone)]
pub enum ProviderClient {
    Google(GoogleClient),
    Outlook(OutlookClient),
}

impl ProviderClient {
    /// Build the client an account config describes.
    pub fn connect(config: AccountConfig) -> SyncResult<Self> {
        match config {
            AccountConfig::Google(c) => Ok(ProviderClient::Google(GoogleClient::new(c)?)),
            AccountConfig::Microsoft(c) => Ok(ProviderClient::Outlook(OutlookClient::new(c)?)),
        }
    }

    fn inner(&self) -> &dyn CalendarClient {
        match self {
            ProviderClient::Google(c) => c,
            ProviderClient::Outlook(c) => c,
        }
    }
}

#[async_trait]
impl CalendarClient for ProviderClient {
    fn provider(&self) -> ProviderId {
        self.inner().provider()
    }

    fn account_id(&self) -> &str {
        self.inner().account_id()
    }

    async fn list_calendars(&self) -> SyncResult<Vec<Calendar>> {
        self.inner().list_calendars().await
    }

    async fn list_events(
        &self,
        calendar: &Calendar,
        range: &DateRange,
        time_zone: Tz,
    ) -> SyncResult<EventPage> {
        self.inner().list_events(calendar, range, time_zone).await
    }

    async fn sync(
        &self,
        calendar: &Calendar,
        sync_token: Option<&str>,
        range: Option<&DateRange>,
        time_zone: Tz,
    ) -> SyncResult<SyncDelta> {
        self.inner()
            .sync(calendar, sync_token, range, time_zone)
            .await
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> SyncResult<CalendarEvent> {
        self.inner().get_event(calendar_id, event_id).await
    }

    async fn create_event(
        &self,
        calendar: &Calendar,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent> {
        self.inner().create_event(calendar, input).await
    }

    async fn update_event(
        &self,
        calendar: &Calendar,
        event_id: &str,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent> {
        self.inner().update_event(calendar, event_id, input).await
    }

    async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<()> {
        self.inner()
            .delete_event(calendar_id, event_id, notify_attendees)
            .await
    }

    async fn move_event(
        &self,
        source: &Calendar,
        dest: &Calendar,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<CalendarEvent> {
        self.inner()
            .move_event(source, dest, event_id, notify_attendees)
            .await
    }

    async fn respond_to_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        response: ParticipationStatus,
    ) -> SyncResult<()> {
        self.inner()
            .respond_to_event(calendar_id, event_id, response)
            .await
    }

    async fn free_busy(
        &self,
        schedule_ids: &[String],
        range: &DateRange,
    ) -> SyncResult<Vec<CalendarFreeBusy>> {
        self.inner().free_busy(schedule_ids, range).await
    }
}
