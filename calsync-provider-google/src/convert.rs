//! Conversion between Calendar v3 wire shapes and the normalized types.

use calsync_core::{
    Attendee, Calendar, CalendarEvent, EventIdentity, EventInput, EventTime, ParticipationStatus,
};
use chrono_tz::Tz;

use crate::wire::{GoogleAttendee, GoogleEvent, GoogleEventTime, GoogleEventWrite};

/// Normalize one Google event, scoped to `calendar`.
///
/// Returns `None` for entries without usable start/end times (Google emits
/// a handful of degenerate shapes, e.g. birthday placeholders); the caller
/// logs and skips them.
pub fn from_google_event(event: GoogleEvent, calendar: &Calendar) -> Option<CalendarEvent> {
    let start = event_time(event.start.as_ref()?)?;
    let end = event_time(event.end.as_ref()?)?;

    let organizer = event.organizer.as_ref().map(|o| Attendee {
        name: if o.display_name.is_empty() {
            None
        } else {
            Some(o.display_name.clone())
        },
        email: o.email.clone(),
        response_status: None,
    });

    let response_status = event
        .attendees
        .iter()
        .find(|a| a.is_self)
        .and_then(|a| participation_status(&a.response_status));

    let attendees: Vec<Attendee> = event
        .attendees
        .iter()
        .map(|a| Attendee {
            name: if a.display_name.is_empty() {
                None
            } else {
                Some(a.display_name.clone())
            },
            email: a.email.clone(),
            response_status: participation_status(&a.response_status),
        })
        .collect();

    let conference_url = event.conference_data.as_ref().and_then(|cd| {
        cd.entry_points
            .iter()
            .find(|ep| ep.entry_point_type == "video")
            .map(|ep| ep.uri.clone())
    });

    Some(CalendarEvent {
        id: event.id,
        calendar_id: calendar.id.clone(),
        account_id: calendar.account_id.clone(),
        provider: calendar.provider,
        provider_account_id: calendar.provider_account_id.clone(),
        title: if event.summary.is_empty() {
            "(No title)".to_string()
        } else {
            event.summary
        },
        description: if event.description.is_empty() {
            None
        } else {
            Some(event.description)
        },
        location: if event.location.is_empty() {
            None
        } else {
            Some(event.location)
        },
        start,
        end,
        recurring_event_id: event.recurring_event_id,
        recurrence: if event.recurrence.is_empty() {
            None
        } else {
            Some(event.recurrence)
        },
        read_only: calendar.read_only,
        organizer,
        attendees,
        response_status,
        conference_url,
        updated: event.updated,
    })
}

/// Identity of a cancelled delta entry. Cancelled records carry only the
/// event id; everything else comes from the calendar scope.
pub fn deleted_identity(event: &GoogleEvent, calendar: &Calendar) -> EventIdentity {
    EventIdentity {
        id: event.id.clone(),
        calendar_id: calendar.id.clone(),
        account_id: calendar.account_id.clone(),
        provider: calendar.provider,
        provider_account_id: calendar.provider_account_id.clone(),
    }
}

fn event_time(t: &GoogleEventTime) -> Option<EventTime> {
    if let Some(dt) = t.date_time {
        let time_zone = t
            .time_zone
            .as_deref()
            .and_then(|tz| tz.parse::<Tz>().ok())
            .unwrap_or(Tz::UTC);
        Some(EventTime::DateTime {
            date_time: dt.to_utc(),
            time_zone,
        })
    } else {
        t.date.map(EventTime::Date)
    }
}

fn write_time(t: &EventTime) -> GoogleEventTime {
    match t {
        EventTime::DateTime {
            date_time,
            time_zone,
        } => GoogleEventTime {
            date: None,
            date_time: Some(date_time.fixed_offset()),
            time_zone: Some(time_zone.name().to_string()),
        },
        EventTime::Date(d) => GoogleEventTime {
            date: Some(*d),
            date_time: None,
            time_zone: None,
        },
    }
}

pub fn to_google_write(input: &EventInput) -> GoogleEventWrite {
    GoogleEventWrite {
        summary: input.title.clone(),
        description: input.description.clone(),
        location: input.location.clone(),
        start: write_time(&input.start),
        end: write_time(&input.end),
        attendees: input
            .attendees
            .iter()
            .map(|a| GoogleAttendee {
                display_name: a.name.clone().unwrap_or_default(),
                email: a.email.clone(),
                response_status: a
                    .response_status
                    .map(participation_status_str)
                    .unwrap_or_default()
                    .to_string(),
                is_self: false,
            })
            .collect(),
        recurrence: input.recurrence.clone(),
    }
}

pub fn participation_status(google_status: &str) -> Option<ParticipationStatus> {
    match google_status {
        "accepted" => Some(ParticipationStatus::Accepted),
        "declined" => Some(ParticipationStatus::Declined),
        "tentative" => Some(ParticipationStatus::Tentative),
        "needsAction" => Some(ParticipationStatus::NeedsAction),
        _ => None,
    }
}

pub fn participation_status_str(status: ParticipationStatus) -> &'static str {
    match status {
        ParticipationStatus::Accepted => "accepted",
        ParticipationStatus::Declined => "declined",
        ParticipationStatus::Tentative => "tentative",
        ParticipationStatus::NeedsAction => "needsAction",
    }
}
