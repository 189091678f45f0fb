//! Free/busy query results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Busy intervals for one schedule (a calendar id or an attendee address,
/// depending on the provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarFreeBusy {
    pub schedule_id: String,
    pub busy: Vec<BusyInterval>,
}

/// One busy interval, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
