//! Conversion between Graph wire shapes and the normalized types.

use calsync_core::{
    Attendee, Calendar, CalendarEvent, EventIdentity, EventInput, EventTime, ParticipationStatus,
};
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::wire::{
    GraphAttendee, GraphBody, GraphDateTimeZone, GraphEmailAddress, GraphEvent, GraphEventWrite,
    GraphLocation,
};

/// Normalize one Graph event, scoped to `calendar`.
///
/// Returns `None` for entries without parseable start/end times; the
/// caller logs and skips them.
pub fn from_graph_event(event: GraphEvent, calendar: &Calendar) -> Option<CalendarEvent> {
    let start = event_time(event.start.as_ref()?, event.is_all_day)?;
    let end = event_time(event.end.as_ref()?, event.is_all_day)?;

    let description = event.body.as_ref().and_then(|b| {
        let text = if b.content_type.eq_ignore_ascii_case("html") {
            html_to_text(&b.content)
        } else {
            b.content.clone()
        };
        let text = text.trim().to_string();
        if text.is_empty() { None } else { Some(text) }
    });

    let organizer = event.organizer.as_ref().map(|o| Attendee {
        name: optional(&o.email_address.name),
        email: o.email_address.address.clone(),
        response_status: None,
    });

    let attendees: Vec<Attendee> = event
        .attendees
        .iter()
        .map(|a| Attendee {
            name: optional(&a.email_address.name),
            email: a.email_address.address.clone(),
            response_status: a
                .status
                .as_ref()
                .and_then(|s| participation_status(&s.response)),
        })
        .collect();

    let response_status = event
        .response_status
        .as_ref()
        .and_then(|s| participation_status(&s.response));

    Some(CalendarEvent {
        id: event.id,
        calendar_id: calendar.id.clone(),
        account_id: calendar.account_id.clone(),
        provider: calendar.provider,
        provider_account_id: calendar.provider_account_id.clone(),
        title: if event.subject.is_empty() {
            "(No title)".to_string()
        } else {
            event.subject
        },
        description,
        location: event
            .location
            .as_ref()
            .and_then(|l| optional(&l.display_name)),
        start,
        end,
        recurring_event_id: event.series_master_id,
        // Graph reports series rules as structured patterns, not RRULEs;
        // instances are what the sync surface consumes.
        recurrence: None,
        read_only: calendar.read_only,
        organizer,
        attendees,
        response_status,
        conference_url: event
            .online_meeting
            .as_ref()
            .and_then(|m| optional(&m.join_url)),
        updated: event.last_modified_date_time,
    })
}

/// Identity of a delta entry flagged `@removed`.
pub fn deleted_identity(event: &GraphEvent, calendar: &Calendar) -> EventIdentity {
    EventIdentity {
        id: event.id.clone(),
        calendar_id: calendar.id.clone(),
        account_id: calendar.account_id.clone(),
        provider: calendar.provider,
        provider_account_id: calendar.provider_account_id.clone(),
    }
}

/// Parse Graph's `{dateTime, timeZone}` wall-clock pair.
pub fn event_time(t: &GraphDateTimeZone, is_all_day: bool) -> Option<EventTime> {
    let naive = NaiveDateTime::parse_from_str(&t.date_time, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    if is_all_day {
        return Some(EventTime::Date(naive.date()));
    }
    let tz: Tz = t.time_zone.parse().unwrap_or(Tz::UTC);
    let local = match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(earliest, _) => {
            tracing::warn!(time = %t.date_time, zone = %t.time_zone, "ambiguous local time, picking earliest");
            earliest
        }
        chrono::LocalResult::None => return None,
    };
    Some(EventTime::DateTime {
        date_time: local.with_timezone(&chrono::Utc),
        time_zone: tz,
    })
}

pub fn write_time(t: &EventTime) -> GraphDateTimeZone {
    match t {
        EventTime::DateTime {
            date_time,
            time_zone,
        } => GraphDateTimeZone {
            date_time: date_time
                .with_timezone(time_zone)
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.7f")
                .to_string(),
            time_zone: time_zone.name().to_string(),
        },
        EventTime::Date(d) => GraphDateTimeZone {
            date_time: format!("{}T00:00:00.0000000", d.format("%Y-%m-%d")),
            time_zone: "UTC".to_string(),
        },
    }
}

pub fn to_graph_write(input: &EventInput) -> GraphEventWrite {
    if input.recurrence.is_some() {
        // Graph wants patterned recurrence objects, not RRULE lines; series
        // authoring on this provider goes through the original client.
        tracing::warn!("dropping recurrence rules on graph write");
    }
    GraphEventWrite {
        subject: input.title.clone(),
        body: input.description.as_ref().map(|d| GraphBody {
            content_type: "text".to_string(),
            content: d.clone(),
        }),
        location: input.location.as_ref().map(|l| GraphLocation {
            display_name: l.clone(),
        }),
        start: write_time(&input.start),
        end: write_time(&input.end),
        is_all_day: matches!(input.start, EventTime::Date(_)),
        attendees: input
            .attendees
            .iter()
            .map(|a| GraphAttendee {
                email_address: GraphEmailAddress {
                    name: a.name.clone().unwrap_or_default(),
                    address: a.email.clone(),
                },
                status: None,
                attendee_type: "required".to_string(),
            })
            .collect(),
    }
}

pub fn participation_status(graph_response: &str) -> Option<ParticipationStatus> {
    match graph_response {
        "accepted" | "organizer" => Some(ParticipationStatus::Accepted),
        "declined" => Some(ParticipationStatus::Declined),
        "tentativelyAccepted" => Some(ParticipationStatus::Tentative),
        "notResponded" => Some(ParticipationStatus::NeedsAction),
        _ => None,
    }
}

fn optional(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80).unwrap_or_else(|_| html.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::ProviderId;

    fn test_calendar() -> Calendar {
        Calendar {
            id: "cal1".to_string(),
            account_id: "personal".to_string(),
            provider: ProviderId::Microsoft,
            provider_account_id: "user@outlook.com".to_string(),
            name: "Calendar".to_string(),
            time_zone: None,
            primary: true,
            read_only: false,
        }
    }

    #[test]
    fn wall_clock_time_resolves_through_its_zone() {
        let t = GraphDateTimeZone {
            date_time: "2024-01-01T09:00:00.0000000".to_string(),
            time_zone: "Europe/Stockholm".to_string(),
        };
        let parsed = event_time(&t, false).unwrap();
        // 09:00 in Stockholm in January is 08:00 UTC.
        assert_eq!(
            parsed.to_utc(),
            chrono::DateTime::parse_from_rfc3339("2024-01-01T08:00:00Z").unwrap()
        );
        assert_eq!(parsed.time_zone(), Some(chrono_tz::Europe::Stockholm));
    }

    #[test]
    fn all_day_event_maps_to_date() {
        let t = GraphDateTimeZone {
            date_time: "2024-06-01T00:00:00.0000000".to_string(),
            time_zone: "UTC".to_string(),
        };
        assert_eq!(
            event_time(&t, true),
            Some(EventTime::Date(
                chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
            ))
        );
    }

    #[test]
    fn html_body_is_down_converted() {
        let event = GraphEvent {
            id: "e1".to_string(),
            subject: "Review".to_string(),
            body: Some(GraphBody {
                content_type: "html".to_string(),
                content: "<p>Agenda:</p><ul><li>roadmap</li></ul>".to_string(),
            }),
            start: Some(GraphDateTimeZone {
                date_time: "2024-01-01T09:00:00.0000000".to_string(),
                time_zone: "UTC".to_string(),
            }),
            end: Some(GraphDateTimeZone {
                date_time: "2024-01-01T10:00:00.0000000".to_string(),
                time_zone: "UTC".to_string(),
            }),
            ..Default::default()
        };
        let normalized = from_graph_event(event, &test_calendar()).unwrap();
        let description = normalized.description.unwrap();
        assert!(description.contains("Agenda:"));
        assert!(!description.contains("<p>"));
    }
}
