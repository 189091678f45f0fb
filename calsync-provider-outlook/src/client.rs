//! Microsoft Graph calendar client.

use async_trait::async_trait;
use calsync_core::constants::{EVENTS_FETCH_CAP, EVENTS_PAGE_SIZE};
use calsync_core::{
    BusyInterval, Calendar, CalendarClient, CalendarEvent, CalendarEventSyncItem,
    CalendarFreeBusy, DateRange, ErrorContext, EventInput, EventPage, ParticipationStatus,
    ProviderId, SyncDelta, SyncError, SyncResult,
};
use chrono_tz::Tz;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::OutlookConfig;
use crate::convert::{deleted_identity, event_time, from_graph_event, to_graph_write};
use crate::wire::{
    GetScheduleRequest, GraphCalendar, GraphDateTimeZone, GraphEvent, GraphPage,
    ScheduleInformation,
};

/// Client for one connected Microsoft account.
#[derive(Debug, Clone)]
pub struct OutlookClient {
    http: reqwest::Client,
    config: OutlookConfig,
}

impl OutlookClient {
    pub fn new(config: OutlookConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {e}")))?;
        Ok(OutlookClient { http, config })
    }

    fn ctx(&self, operation: &'static str) -> ErrorContext<'_> {
        ErrorContext {
            provider: ProviderId::Microsoft,
            account_id: &self.config.account_id,
            operation,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, ctx: &ErrorContext<'_>, req: RequestBuilder) -> SyncResult<Response> {
        req.send().await.map_err(|e| ctx.transport(e))
    }

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
            provider: ProviderId::Microsoft,
            provider_account_id: self.config.provider_account_id.clone(),
            name: String::new(),
            time_zone: None,
            primary: false,
            read_only: false,
        }
    }

    /// Fetch the master events for the distinct series referenced by
    /// `events`. Masters that are gone remotely are skipped, not fatal.
    async fn fetch_series_masters(
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

    fn push_delta_items(
        &self,
        calendar: &Calendar,
        items: Vec<GraphEvent>,
        changes: &mut Vec<CalendarEventSyncItem>,
    ) {
        for event in items {
            if event.id.is_empty() {
                continue;
            }
            if event.removed.is_some() || event.is_cancelled {
                changes.push(CalendarEventSyncItem::Deleted {
                    event: deleted_identity(&event, calendar),
                });
            } else {
                match from_graph_event(event, calendar) {
                    Some(e) => changes.push(CalendarEventSyncItem::Updated { event: e }),
                    None => {
                        tracing::warn!(calendar = %calendar.id, "skipping event without times");
                    }
                }
            }
        }
    }
}

/// Pull `$deltatoken` out of an `@odata.deltaLink`.
fn delta_token(link: &str) -> Option<String> {
    let parsed = url::Url::parse(link).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "$deltatoken")
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl CalendarClient for OutlookClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Microsoft
    }

    fn account_id(&self) -> &str {
        &self.config.account_id
    }

    async fn list_calendars(&self) -> SyncResult<Vec<Calendar>> {
        let ctx = self.ctx("list_calendars");
        let mut calendars = Vec::new();
        let mut next: Option<String> = Some(self.url("me/calendars"));

        while let Some(url) = next.take() {
            let resp = self
                .send(&ctx, self.http.get(url).bearer_auth(&self.config.access_token))
                .await?;
            let page: GraphPage<GraphCalendar> =
                self.expect_json(&ctx, resp, "calendar list").await?;

            for entry in page.value {
                if entry.id.is_empty() {
                    continue;
                }
                calendars.push(Calendar {
                    id: entry.id,
                    account_id: self.config.account_id.clone(),
                    provider: ProviderId::Microsoft,
                    provider_account_id: self.config.provider_account_id.clone(),
                    name: if entry.name.is_empty() {
                        "(unnamed)".to_string()
                    } else {
                        entry.name
                    },
                    time_zone: None,
                    primary: entry.is_default_calendar,
                    read_only: !entry.can_edit,
                });
            }
            next = page.next_link;
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
        let prefer = format!("outlook.timezone=\"{}\"", time_zone.name());
        let mut events = Vec::new();

        let first = self
            .http
            .get(self.url(&format!("me/calendars/{}/calendarView", calendar.id)))
            .bearer_auth(&self.config.access_token)
            .header("Prefer", &prefer)
            .query(&[
                ("startDateTime", range.from_rfc3339().as_str()),
                ("endDateTime", range.to_rfc3339().as_str()),
                ("$top", EVENTS_PAGE_SIZE.to_string().as_str()),
            ]);
        let mut pending = Some(first);

        while let Some(req) = pending.take() {
            let resp = self.send(&ctx, req).await?;
            let page: GraphPage<GraphEvent> = self.expect_json(&ctx, resp, &calendar.id).await?;

            for event in page.value {
                if event.is_cancelled || event.id.is_empty() {
                    continue;
                }
                match from_graph_event(event, calendar) {
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
            pending = page.next_link.map(|link| {
                self.http
                    .get(link)
                    .bearer_auth(&self.config.access_token)
                    .header("Prefer", &prefer)
            });
        }

        let recurring_masters = self.fetch_series_masters(calendar, &events).await?;

        tracing::debug!(
            calendar = %calendar.id,
            events = events.len(),
            masters = recurring_masters.len(),
            "graph list complete"
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
        let prefer = format!("outlook.timezone=\"{}\"", time_zone.name());
        let delta_path = self.url(&format!("me/calendars/{}/calendarView/delta", calendar.id));
        let mut changes = Vec::new();
        let mut latest_token: Option<String> = None;

        let first = match sync_token {
            Some(token) => self
                .http
                .get(&delta_path)
                .bearer_auth(&self.config.access_token)
                .header("Prefer", &prefer)
                .query(&[("$deltatoken", token)]),
            None => {
                let window = range.copied().unwrap_or_default();
                self.http
                    .get(&delta_path)
                    .bearer_auth(&self.config.access_token)
                    .header("Prefer", &prefer)
                    .query(&[
                        ("startDateTime", window.from_rfc3339().as_str()),
                        ("endDateTime", window.to_rfc3339().as_str()),
                    ])
            }
        };
        let mut pending = Some(first);

        while let Some(req) = pending.take() {
            let resp = self.send(&ctx, req).await?;
            if resp.status() == StatusCode::GONE {
                return Err(ctx.token_expired(&calendar.id));
            }
            let page: GraphPage<GraphEvent> = self.expect_json(&ctx, resp, &calendar.id).await?;

            self.push_delta_items(calendar, page.value, &mut changes);

            // Graph emits the delta link on the final page only, but keep
            // whatever was seen last in case that ever changes.
            if let Some(link) = page.delta_link {
                if let Some(token) = delta_token(&link) {
                    latest_token = Some(token);
                }
            }

            pending = page.next_link.map(|link| {
                self.http
                    .get(link)
                    .bearer_auth(&self.config.access_token)
                    .header("Prefer", &prefer)
            });
        }

        tracing::debug!(
            calendar = %calendar.id,
            changes = changes.len(),
            incremental = sync_token.is_some(),
            "graph delta walk complete"
        );
        Ok(SyncDelta {
            changes,
            sync_token: latest_token,
        })
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> SyncResult<CalendarEvent> {
        let ctx = self.ctx("get_event");
        let resp = self
            .send(
                &ctx,
                self.http
                    .get(self.url(&format!("me/events/{event_id}")))
                    .bearer_auth(&self.config.access_token),
            )
            .await?;
        let wire: GraphEvent = self.expect_json(&ctx, resp, event_id).await?;
        from_graph_event(wire, &self.scope_calendar(calendar_id))
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
                    .post(self.url(&format!("me/calendars/{}/events", calendar.id)))
                    .bearer_auth(&self.config.access_token)
                    .json(&to_graph_write(input)),
            )
            .await?;
        let wire: GraphEvent = self.expect_json(&ctx, resp, &calendar.id).await?;
        from_graph_event(wire, calendar)
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
                    .patch(self.url(&format!("me/calendars/{}/events/{event_id}", calendar.id)))
                    .bearer_auth(&self.config.access_token)
                    .json(&to_graph_write(input)),
            )
            .await?;
        let wire: GraphEvent = self.expect_json(&ctx, resp, event_id).await?;
        from_graph_event(wire, calendar)
            .ok_or_else(|| ctx.provider(None, "updated event has no usable start/end"))
    }

    async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        _notify_attendees: bool,
    ) -> SyncResult<()> {
        let ctx = self.ctx("delete_event");
        let resp = self
            .send(
                &ctx,
                self.http
                    .delete(self.url(&format!("me/calendars/{calendar_id}/events/{event_id}")))
                    .bearer_auth(&self.config.access_token),
            )
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
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
        _notify_attendees: bool,
    ) -> SyncResult<CalendarEvent> {
        let ctx = self.ctx("move_event");
        let resp = self
            .send(
                &ctx,
                self.http
                    .post(self.url(&format!(
                        "me/calendars/{}/events/{event_id}/move",
                        source.id
                    )))
                    .bearer_auth(&self.config.access_token)
                    .json(&serde_json::json!({ "destinationId": dest.id })),
            )
            .await?;
        let wire: GraphEvent = self.expect_json(&ctx, resp, event_id).await?;
        from_graph_event(wire, dest)
            .ok_or_else(|| ctx.provider(None, "moved event has no usable start/end"))
    }

    async fn respond_to_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        response: ParticipationStatus,
    ) -> SyncResult<()> {
        let ctx = self.ctx("respond_to_event");
        let action = match response {
            ParticipationStatus::Accepted => "accept",
            ParticipationStatus::Declined => "decline",
            ParticipationStatus::Tentative => "tentativelyAccept",
            ParticipationStatus::NeedsAction => {
                return Err(ctx.provider(None, "cannot respond with needs_action"));
            }
        };

        let resp = self
            .send(
                &ctx,
                self.http
                    .post(self.url(&format!(
                        "me/calendars/{calendar_id}/events/{event_id}/{action}"
                    )))
                    .bearer_auth(&self.config.access_token)
                    .json(&serde_json::json!({ "sendResponse": false })),
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
        let body = GetScheduleRequest {
            schedules: schedule_ids.to_vec(),
            start_time: GraphDateTimeZone {
                date_time: range.from_rfc3339(),
                time_zone: "UTC".to_string(),
            },
            end_time: GraphDateTimeZone {
                date_time: range.to_rfc3339(),
                time_zone: "UTC".to_string(),
            },
            availability_view_interval: 30,
        };
        let resp = self
            .send(
                &ctx,
                self.http
                    .post(self.url("me/calendar/getSchedule"))
                    .bearer_auth(&self.config.access_token)
                    .json(&body),
            )
            .await?;
        let page: GraphPage<ScheduleInformation> =
            self.expect_json(&ctx, resp, "free/busy").await?;

        let mut result: Vec<CalendarFreeBusy> = page
            .value
            .into_iter()
            .map(|schedule| CalendarFreeBusy {
                schedule_id: schedule.schedule_id,
                busy: schedule
                    .schedule_items
                    .iter()
                    .filter(|item| matches!(item.status.as_str(), "busy" | "oof" | "tentative"))
                    .filter_map(|item| {
                        let start = event_time(&item.start, false)?;
                        let end = event_time(&item.end, false)?;
                        Some(BusyInterval {
                            start: start.to_utc(),
                            end: end.to_utc(),
                        })
                    })
                    .collect(),
            })
            .collect();
        result.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        Ok(result)
    }
}
