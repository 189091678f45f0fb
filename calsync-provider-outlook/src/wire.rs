//! Serde shapes for the Microsoft Graph calendar API.
//!
//! Only the fields the sync protocol reads are modeled; everything else in
//! Graph's payloads is ignored on deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphPage<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    pub delta_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphCalendar {
    pub id: String,
    pub name: String,
    pub is_default_calendar: bool,
    pub can_edit: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphEvent {
    pub id: String,
    pub subject: String,
    pub body: Option<GraphBody>,
    pub location: Option<GraphLocation>,
    pub start: Option<GraphDateTimeZone>,
    pub end: Option<GraphDateTimeZone>,
    pub is_all_day: bool,
    pub is_cancelled: bool,
    /// Present on occurrences and exceptions of a recurring series.
    pub series_master_id: Option<String>,
    pub organizer: Option<GraphRecipient>,
    pub attendees: Vec<GraphAttendee>,
    pub response_status: Option<GraphResponseStatus>,
    pub online_meeting: Option<GraphOnlineMeeting>,
    pub last_modified_date_time: Option<DateTime<Utc>>,
    /// Delta marker: the event was deleted since the last token.
    #[serde(rename = "@removed")]
    pub removed: Option<GraphRemoved>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphRemoved {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphBody {
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphLocation {
    pub display_name: String,
}

/// Graph's wall-clock time: a naive timestamp plus a zone name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphDateTimeZone {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphRecipient {
    pub email_address: GraphEmailAddress,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphEmailAddress {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphAttendee {
    pub email_address: GraphEmailAddress,
    pub status: Option<GraphResponseStatus>,
    #[serde(rename = "type")]
    pub attendee_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphResponseStatus {
    /// "accepted", "declined", "tentativelyAccepted", "notResponded",
    /// "organizer", or "none".
    pub response: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphOnlineMeeting {
    pub join_url: String,
}

/// Write shape for event create/update calls.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEventWrite {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<GraphBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GraphLocation>,
    pub start: GraphDateTimeZone,
    pub end: GraphDateTimeZone,
    pub is_all_day: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<GraphAttendee>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScheduleRequest {
    pub schedules: Vec<String>,
    pub start_time: GraphDateTimeZone,
    pub end_time: GraphDateTimeZone,
    pub availability_view_interval: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleInformation {
    pub schedule_id: String,
    pub schedule_items: Vec<ScheduleItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleItem {
    /// "free", "tentative", "busy", "oof", or "workingElsewhere".
    pub status: String,
    pub start: GraphDateTimeZone,
    pub end: GraphDateTimeZone,
}
