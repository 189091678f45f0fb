//! Serde shapes for the Calendar v3 REST API.
//!
//! Only the fields the sync protocol reads are modeled; everything else in
//! Google's payloads is ignored on deserialize.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarListPage {
    pub items: Vec<CalendarListEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: String,
    pub time_zone: Option<String>,
    pub access_role: String,
    pub primary: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventsPage {
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleEvent {
    pub id: String,
    /// "confirmed", "tentative", or "cancelled". Cancelled entries in a
    /// delta walk are deletions.
    pub status: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: Option<GoogleEventTime>,
    pub end: Option<GoogleEventTime>,
    pub recurring_event_id: Option<String>,
    pub recurrence: Vec<String>,
    pub attendees: Vec<GoogleAttendee>,
    pub organizer: Option<GoogleOrganizer>,
    pub conference_data: Option<ConferenceData>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleAttendee {
    pub display_name: String,
    pub email: String,
    pub response_status: String,
    #[serde(rename = "self")]
    pub is_self: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleOrganizer {
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConferenceData {
    pub entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryPoint {
    pub entry_point_type: String,
    pub uri: String,
}

/// Write shape for event create/update calls.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventWrite {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: GoogleEventTime,
    pub end: GoogleEventTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<GoogleAttendee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyRequest {
    pub time_min: String,
    pub time_max: String,
    pub items: Vec<FreeBusyRequestItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreeBusyRequestItem {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FreeBusyResponse {
    pub calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FreeBusyCalendar {
    pub busy: Vec<FreeBusyInterval>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreeBusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
