//! Google Calendar v3 client.

use async_trait::async_trait;
use calsync_core::constants::{EVENTS_FETCH_CAP, EVENTS_PAGE_SIZE};
use calsync_core::{
    Calendar, CalendarClient, CalendarEvent, CalendarEventSyncItem, CalendarFreeBusy, DateRange,
    ErrorContext, EventInput, EventPage, ParticipationStatus, ProviderId, SyncDelta, SyncResult,
};
use calsync_core::{BusyInterval, SyncError};
use chrono_tz::Tz;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::GoogleConfig;
use crate::convert::{
    deleted_identity, from_google_event, participation_status_str, to_google_write,
};
use crate::wire::{
    CalendarListPage, EventsPage, FreeBusyRequest, FreeBusyRequestItem, FreeBusyResponse,
    GoogleEvent,
};

/// Client for one connected Google account.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {e}")))?;
        Ok(GoogleClient { http, config })
    }

    fn ctx(&self, operation: &'static str) -> ErrorContext<'_> {
        ErrorContext {
            provider: ProviderId::Google,
            account_id: &self.config.account_id,
            operation,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.config.access_token)
    }

    async fn send(&self, ctx: &ErrorContext<'_>, req: RequestBuilder) -> SyncResult<Response> {
        req.send().await.map_err(|e| ctx.transport(e))
    }

    /// Decode a success response, or map the failure status.
    async fn expect_json<T: DeserializeOwned>(
        &self,
        ctx: &ErrorContext<'_>,
        resp: Response,
        resource: &str,
    ) -> SyncResult<T> {
        if resp.status().is_success() {
            resp.json::<T>().await.map_err(|e| ctx.decode(e))
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(ctx.from_status(status, resource, &body))
        }
    }

    /// The calendar scope events fetched by bare id get attributed to.
    fn scope_calendar(&self, calendar_id: &str) -> Calendar {
        Calendar {
            id: calendar_id.to_string(),
            account_id: self.config.account_id.clone(),
            provider: ProviderId::Google,
            provider_account_id: self.config.provider_account_id.clone(),
            name: String::new(),
            time_zone: None,
            primary: false,
            read_only: false,
        }
    }

    async fn get_wire_event(
        &self,
        ctx: &ErrorContext<'_>,
        calendar_id: &str,
        event_id: &str,
    ) -> SyncResult<GoogleEvent> {
        let resp = self
            .send(
                ctx,
                self.get(&format!("calendars/{calendar_id}/events/{event_id}")),
            )
            .await?;
        self.expect_json(ctx, resp, event_id).await
    }

    /// Fetch the master events for the distinct series referenced by
    /// `events`. Masters that are gone remotely are skipped, not fatal.
    async fn fetch_recurring_masters(
        &self,
        calendar: &Calendar,
        events: &[CalendarEvent],
    ) -> SyncResult<Vec<CalendarEvent>> {
        let mut master_ids: Vec<&str> = events
            .iter()
            .filter_map(|e| e.recurring_event_id.as_deref())
            .collect();
        master_ids.sort_unstable();
        master_ids.dedup();

        let mut masters = Vec::with_capacity(master_ids.len());
        for id in master_ids {
            match self.get_event(&calendar.id, id).await {
                Ok(master) => masters.push(master),
                Err(e) if e.is_not_found() => {
                    tracing::warn!(calendar = %calendar.id, master = id, "series master missing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(masters)
    }
}

#[async_trait]
impl CalendarClient for GoogleClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Google
    }

    fn account_id(&self) -> &str {
        &self.config.account_id
    }

    async fn list_calendars(&self) -> SyncResult<Vec<Calendar>> {
        let ctx = self.ctx("list_calendars");
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.get("users/me/calendarList");
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let resp = self.send(&ctx, req).await?;
            let page: CalendarListPage = self.expect_json(&ctx, resp, "calendar list").await?;

            for entry in page.items {
                if entry.deleted || entry.id.is_empty() {
                    continue;
                }
                let read_only = matches!(entry.access_role.as_str(), "reader" | "freeBusyReader");
                calendars.push(Calendar {
                    id: entry.id,
                    account_id: self.config.account_id.clone(),
                    provider: ProviderId::Google,
                    provider_account_id: self.config.provider_account_id.clone(),
                    name: if entry.summary.is_empty() {
                        "(unnamed)".to_string()
                    } else {
                        entry.summary
                    },
                    time_zone: entry.time_zone.and_then(|tz| tz.parse::<Tz>().ok()),
                    primary: entry.primary,
                    read_only,
                });
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }

    async fn list_events(
        &self,
        calendar: &Calendar,
        range: &DateRange,
        time_zone: Tz,
    ) -> SyncResult<EventPage> {
        let ctx = self.ctx("list_events");
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let time_min = range.from_rfc3339();
        let time_max = range.to_rfc3339();
        let page_size = EVENTS_PAGE_SIZE.to_string();

        loop {
            let mut req = self
                .get(&format!("calendars/{}/events", calendar.id))
                .query(&[
                    ("singleEvents", "true"),
                    ("timeMin", time_min.as_str()),
                    ("timeMax", time_max.as_str()),
                    ("timeZone", time_zone.name()),
                    ("maxResults", page_size.as_str()),
                ]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let resp = self.send(&ctx, req).await?;
            let page: EventsPage = self.expect_json(&ctx, resp, &calendar.id).await?;

            for event in page.items {
                if event.status == "cancelled" || event.id.is_empty() {
                    continue;
                }
                match from_google_event(event, calendar) {
                    Some(e) => events.push(e),
                    None => tracing::warn!(calendar = %calendar.id, "skipping event without times"),
                }
            }

            if events.len() >= EVENTS_FETCH_CAP {
                tracing::warn!(
                    calendar = %calendar.id,
                    cap = EVENTS_FETCH_CAP,
                    "per-calendar fetch cap reached, truncating"
                );
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let recurring_masters = self.fetch_recurring_masters(calendar, &events).await?;

        tracing::debug!(
            calendar = %calendar.id,
            events = events.len(),
            masters = recurring_masters.len(),
            "google list complete"
        );
        Ok(EventPage {
            events,
            recurring_masters,
        })
    }

    async fn sync(
        &self,
        calendar: &Calendar,
        sync_token: Option<&str>,
        range: Option<&DateRange>,
        time_zone: Tz,
    ) -> SyncResult<SyncDelta> {
        let ctx = self.ctx("sync");
        let mut changes = Vec::new();
        let mut page_token: Option<String> = None;
        let mut latest_token: Option<String> = None;

        loop {
            let mut req = self
                .get(&format!("calendars/{}/events", calendar.id))
                .query(&[
                    ("maxResults", EVENTS_PAGE_SIZE.to_string().as_str()),
                    ("showDeleted", "true"),
                ]);
            match sync_token {
                // Google rejects window filters alongside a sync token.
                Some(token) => req = req.query(&[("syncToken", token)]),
                None => {
                    req = req.query(&[
                        ("singleEvents", "true"),
                        ("timeZone", time_zone.name()),
                    ]);
                    if let Some(range) = range {
                        req = req.query(&[
                            ("timeMin", &range.from_rfc3339()),
                            ("timeMax", &range.to_rfc3339()),
                        ]);
                    }
                }
            }
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let resp = self.send(&ctx, req).await?;
            if resp.status() == StatusCode::GONE {
                return Err(ctx.token_expired(&calendar.id));
            }
            let page: EventsPage = self.expect_json(&ctx, resp, &calendar.id).await?;

            // Keep the last token seen across the walk, not only the final
            // page's; Google does not emit one on every page.
            if let Some(token) = page.next_sync_token {
                latest_token = Some(token);
            }

            for event in page.items {
                if event.id.is_empty() {
                    continue;
                }
                if event.status == "cancelled" {
                    changes.push(CalendarEventSyncItem::Deleted {
                        event: deleted_identity(&event, calendar),
                    });
                } else {
                    match from_google_event(event, calendar) {
                        Some(e) => changes.push(CalendarEventSyncItem::Updated { event: e }),
                        None => {
                            tracing::warn!(calendar = %calendar.id, "skipping event without times");
                        }
                    }
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(
            calendar = %calendar.id,
            changes = changes.len(),
            incremental = sync_token.is_some(),
            "google delta walk complete"
        );
        Ok(SyncDelta {
            changes,
            sync_token: latest_token,
        })
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> SyncResult<CalendarEvent> {
        let ctx = self.ctx("get_event");
        let wire = self.get_wire_event(&ctx, calendar_id, event_id).await?;
        from_google_event(wire, &self.scope_calendar(calendar_id))
            .ok_or_else(|| ctx.provider(None, "event has no usable start/end"))
    }

    async fn create_event(
        &self,
        calendar: &Calendar,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent> {
        let ctx = self.ctx("create_event");
        let resp = self
            .send(
                &ctx,
                self.http
                    .post(self.url(&format!("calendars/{}/events", calendar.id)))
                    .bearer_auth(&self.config.access_token)
                    .query(&[("sendUpdates", "none")])
                    .json(&to_google_write(input)),
            )
            .await?;
        let wire: GoogleEvent = self.expect_json(&ctx, resp, &calendar.id).await?;
        from_google_event(wire, calendar)
            .ok_or_else(|| ctx.provider(None, "created event has no usable start/end"))
    }

    async fn update_event(
        &self,
        calendar: &Calendar,
        event_id: &str,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent> {
        let ctx = self.ctx("update_event");
        let resp = self
            .send(
                &ctx,
                self.http
                    .put(self.url(&format!("calendars/{}/events/{event_id}", calendar.id)))
                    .bearer_auth(&self.config.access_token)
                    .query(&[("sendUpdates", "none")])
                    .json(&to_google_write(input)),
            )
            .await?;
        let wire: GoogleEvent = self.expect_json(&ctx, resp, event_id).await?;
        from_google_event(wire, calendar)
            .ok_or_else(|| ctx.provider(None, "updated event has no usable start/end"))
    }

    async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<()> {
        let ctx = self.ctx("delete_event");
        let send_updates = if notify_attendees { "all" } else { "none" };
        let resp = self
            .send(
                &ctx,
                self.http
                    .delete(self.url(&format!("calendars/{calendar_id}/events/{event_id}")))
                    .bearer_auth(&self.config.access_token)
                    .query(&[("sendUpdates", send_updates)]),
            )
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            // Both statuses mean the event is already gone remotely.
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(ctx.not_found(event_id)),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(ctx.provider(Some(s.as_u16()), body))
            }
        }
    }

    async fn move_event(
        &self,
        source: &Calendar,
        dest: &Calendar,
        event_id: &str,
        notify_attendees: bool,
    ) -> SyncResult<CalendarEvent> {
        let ctx = self.ctx("move_event");
        let send_updates = if notify_attendees { "all" } else { "none" };
        let resp = self
            .send(
                &ctx,
                self.http
                    .post(self.url(&format!(
                        "calendars/{}/events/{event_id}/move",
                        source.id
                    )))
                    .bearer_auth(&self.config.access_token)
                    .query(&[("destination", dest.id.as_str()), ("sendUpdates", send_updates)]),
            )
            .await?;
        let wire: GoogleEvent = self.expect_json(&ctx, resp, event_id).await?;
        from_google_event(wire, dest)
            .ok_or_else(|| ctx.provider(None, "moved event has no usable start/end"))
    }

    async fn respond_to_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        response: ParticipationStatus,
    ) -> SyncResult<()> {
        let ctx = self.ctx("respond_to_event");

        // Google has no response endpoint; the self attendee's status is
        // patched instead. Patch the full attendee list so nobody is dropped.
        let mut wire = self.get_wire_event(&ctx, calendar_id, event_id).await?;
        let own_email = &self.config.provider_account_id;
        let mut found = false;
        for attendee in &mut wire.attendees {
            if attendee.is_self || attendee.email.eq_ignore_ascii_case(own_email) {
                attendee.response_status = participation_status_str(response).to_string();
                found = true;
            }
        }
        if !found {
            return Err(ctx.not_found(format!("attendee {own_email} on event {event_id}")));
        }

        let resp = self
            .send(
                &ctx,
                self.http
                    .patch(self.url(&format!("calendars/{calendar_id}/events/{event_id}")))
                    .bearer_auth(&self.config.access_token)
                    .query(&[("sendUpdates", "none")])
                    .json(&serde_json::json!({ "attendees": wire.attendees })),
            )
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(ctx.from_status(status, event_id, &body))
        }
    }

    async fn free_busy(
        &self,
        schedule_ids: &[String],
        range: &DateRange,
    ) -> SyncResult<Vec<CalendarFreeBusy>> {
        let ctx = self.ctx("free_busy");
        let body = FreeBusyRequest {
            time_min: range.from_rfc3339(),
            time_max: range.to_rfc3339(),
            items: schedule_ids
                .iter()
                .map(|id| FreeBusyRequestItem { id: id.clone() })
                .collect(),
        };
        let resp = self
            .send(
                &ctx,
                self.http
                    .post(self.url("freeBusy"))
                    .bearer_auth(&self.config.access_token)
                    .json(&body),
            )
            .await?;
        let parsed: FreeBusyResponse = self.expect_json(&ctx, resp, "free/busy").await?;

        let mut result: Vec<CalendarFreeBusy> = parsed
            .calendars
            .into_iter()
            .map(|(schedule_id, cal)| CalendarFreeBusy {
                schedule_id,
                busy: cal
                    .busy
                    .into_iter()
                    .map(|b| BusyInterval {
                        start: b.start,
                        end: b.end,
                    })
                    .collect(),
            })
            .collect();
        result.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> GoogleClient {
        GoogleClient::new(GoogleConfig {
            account_id: "work".to_string(),
            provider_account_id: "user@example.com".to_string(),
            access_token: "token".to_string(),
            base_url: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn test_calendar() -> Calendar {
        Calendar {
            id: "primary".to_string(),
            account_id: "work".to_string(),
            provider: ProviderId::Google,
            provider_account_id: "user@example.com".to_string(),
            name: "Work".to_string(),
            time_zone: None,
            primary: true,
            read_only: false,
        }
    }

    fn timed_event(id: &str, start: &str, end: &str) -> serde_json::Value {
        json!({
            "id": id,
            "status": "confirmed",
            "summary": id,
            "start": { "dateTime": start },
            "end": { "dateTime": end },
        })
    }

    #[tokio::test]
    async fn sync_walks_pages_and_keeps_last_seen_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [timed_event("b", "2024-01-02T09:00:00Z", "2024-01-02T10:00:00Z")],
                "nextSyncToken": "s2",
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    timed_event("a", "2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z"),
                    { "id": "gone", "status": "cancelled" },
                ],
                "nextPageToken": "p2",
                "nextSyncToken": "s1",
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let delta = client
            .sync(&test_calendar(), Some("stored"), None, Tz::UTC)
            .await
            .unwrap();

        assert_eq!(delta.sync_token.as_deref(), Some("s2"));
        assert_eq!(delta.changes.len(), 3);
        assert!(matches!(
            &delta.changes[1],
            CalendarEventSyncItem::Deleted { event } if event.id == "gone"
        ));
        assert!(matches!(
            &delta.changes[2],
            CalendarEventSyncItem::Updated { event } if event.id == "b"
        ));
    }

    #[tokio::test]
    async fn rejected_token_is_classified_as_expired() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .sync(&test_calendar(), Some("stale"), None, Tz::UTC)
            .await
            .unwrap_err();
        assert!(err.is_token_expired());
    }

    #[tokio::test]
    async fn delete_maps_already_gone_to_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/evt1"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.delete_event("primary", "evt1", false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_events_expands_series_masters() {
        let server = MockServer::start().await;

        let mut instance = timed_event("m1_20240101", "2024-01-01T09:00:00Z", "2024-01-01T09:15:00Z");
        instance["recurringEventId"] = json!("m1");
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [instance] })))
            .mount(&server)
            .await;

        let mut master = timed_event("m1", "2024-01-01T09:00:00Z", "2024-01-01T09:15:00Z");
        master["recurrence"] = json!(["RRULE:FREQ=DAILY"]);
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(master))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let page = client
            .list_events(&test_calendar(), &DateRange::default(), Tz::UTC)
            .await
            .unwrap();

        assert_eq!(page.events.len(), 1);
        assert_eq!(page.recurring_masters.len(), 1);
        assert_eq!(page.recurring_masters[0].id, "m1");
        assert_eq!(
            page.recurring_masters[0].recurrence.as_deref(),
            Some(["RRULE:FREQ=DAILY".to_string()].as_slice())
        );
    }

    #[tokio::test]
    async fn network_failure_is_classified() {
        // Point at a closed port; the request never completes.
        let client = GoogleClient::new(GoogleConfig {
            account_id: "work".to_string(),
            provider_account_id: "user@example.com".to_string(),
            access_token: "token".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        })
        .unwrap();

        let err = client.list_calendars().await.unwrap_err();
        assert!(matches!(err, SyncError::Network { .. }));
    }
}
