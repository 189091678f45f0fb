//! Provider-neutral event types.
//!
//! Providers convert their API responses into these types, and the sync
//! engine works exclusively with them for reconciliation, aggregation,
//! and the optimistic projection.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// A calendar event, normalized across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Provider-scoped event id.
    pub id: String,
    pub calendar_id: String,
    /// Engine-side account identifier (key into the client map).
    pub account_id: String,
    pub provider: ProviderId,
    /// Provider-side account identifier (usually the account email).
    pub provider_account_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// Back-reference to the master of a recurring series. Never an
    /// ownership link; the master may arrive in a separate fetch.
    pub recurring_event_id: Option<String>,
    /// RRULE/EXDATE lines, present on master events only.
    pub recurrence: Option<Vec<String>>,
    pub read_only: bool,
    pub organizer: Option<Attendee>,
    pub attendees: Vec<Attendee>,
    /// The connected account's own response, when the provider reports one.
    pub response_status: Option<ParticipationStatus>,
    /// Conference/video call URL.
    pub conference_url: Option<String>,
    /// Last modification timestamp reported by the provider.
    pub updated: Option<DateTime<Utc>>,
}

impl CalendarEvent {
    /// The globally unique key for this event across all connected accounts.
    pub fn key(&self) -> EventKey {
        EventKey {
            provider: self.provider,
            provider_account_id: self.provider_account_id.clone(),
            calendar_id: self.calendar_id.clone(),
            id: self.id.clone(),
        }
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            id: self.id.clone(),
            calendar_id: self.calendar_id.clone(),
            account_id: self.account_id.clone(),
            provider: self.provider,
            provider_account_id: self.provider_account_id.clone(),
        }
    }

    /// The UTC instant used as the sort key in aggregated views.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.to_utc()
    }
}

/// Uniquely identifies an event across the whole aggregated set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub provider: ProviderId,
    pub provider_account_id: String,
    pub calendar_id: String,
    pub id: String,
}

/// Identity of an event without its content. Deletions carry only this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIdentity {
    pub id: String,
    pub calendar_id: String,
    pub account_id: String,
    pub provider: ProviderId,
    pub provider_account_id: String,
}

impl EventIdentity {
    pub fn key(&self) -> EventKey {
        EventKey {
            provider: self.provider,
            provider_account_id: self.provider_account_id.clone(),
            calendar_id: self.calendar_id.clone(),
            id: self.id.clone(),
        }
    }
}

impl From<&CalendarEvent> for EventIdentity {
    fn from(event: &CalendarEvent) -> Self {
        event.identity()
    }
}

/// When an event starts or ends.
///
/// Timed events carry the absolute instant plus the IANA zone they were
/// scheduled in, so the display layer can render wall-clock times without
/// re-deriving the zone. All-day events carry a bare date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    DateTime {
        date_time: DateTime<Utc>,
        time_zone: Tz,
    },
    Date(NaiveDate),
}

impl EventTime {
    /// A timed value in UTC.
    pub fn utc(date_time: DateTime<Utc>) -> Self {
        EventTime::DateTime {
            date_time,
            time_zone: Tz::UTC,
        }
    }

    /// The UTC instant used for ordering. All-day events sort at their
    /// UTC midnight.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::DateTime { date_time, .. } => *date_time,
            EventTime::Date(d) => d.and_hms_opt(0, 0, 0).unwrap().and_utc(),
        }
    }

    pub fn time_zone(&self) -> Option<Tz> {
        match self {
            EventTime::DateTime { time_zone, .. } => Some(*time_zone),
            EventTime::Date(_) => None,
        }
    }
}

/// An event attendee (also used for the organizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
    pub response_status: Option<ParticipationStatus>,
}

/// An attendee's response to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
}

/// Caller-supplied payload for create and update calls.
///
/// Identity fields (`id`, calendar, account) never live here; they come
/// from the call site. Providers translate this into their native write
/// shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<Attendee>,
    pub recurrence: Option<Vec<String>>,
}

impl EventInput {
    /// Materialize the event this input describes, scoped to `calendar`.
    /// Used for optimistic overlays before the provider confirms.
    pub fn into_event(self, id: String, calendar: &crate::calendar::Calendar) -> CalendarEvent {
        CalendarEvent {
            id,
            calendar_id: calendar.id.clone(),
            account_id: calendar.account_id.clone(),
            provider: calendar.provider,
            provider_account_id: calendar.provider_account_id.clone(),
            title: self.title,
            description: self.description,
            location: self.location,
            start: self.start,
            end: self.end,
            recurring_event_id: None,
            recurrence: self.recurrence,
            read_only: false,
            organizer: None,
            attendees: self.attendees,
            response_status: None,
            conference_url: None,
            updated: None,
        }
    }

    /// Apply this input on top of an existing event, keeping its identity.
    pub fn apply_to(&self, event: &CalendarEvent) -> CalendarEvent {
        CalendarEvent {
            title: self.title.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            attendees: self.attendees.clone(),
            recurrence: self.recurrence.clone(),
            ..event.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn all_day_events_sort_at_utc_midnight() {
        let date = EventTime::Date(NaiveDate::from_ymd_opt(2024, 3, 20).unwrap());
        let timed = EventTime::utc(Utc.with_ymd_and_hms(2024, 3, 20, 0, 30, 0).unwrap());
        assert!(date.to_utc() < timed.to_utc());
    }

    #[test]
    fn zoned_time_keeps_its_instant() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let t = EventTime::DateTime {
            date_time: instant,
            time_zone: chrono_tz::America::New_York,
        };
        assert_eq!(t.to_utc(), instant);
        assert_eq!(t.time_zone(), Some(chrono_tz::America::New_York));
    }
}
