//! Core types for the calsync ecosystem.
//!
//! This crate provides the shared types used by the sync engine and the
//! calendar providers:
//! - `CalendarEvent` and related types for normalized calendar events
//! - `CalendarClient`, the capability surface every provider implements
//! - `CalendarEventSyncItem` and friends for the incremental sync protocol
//! - the `SyncError` taxonomy shared across the workspace

pub mod calendar;
pub mod constants;
pub mod date_range;
pub mod error;
pub mod event;
pub mod freebusy;
pub mod provider;
pub mod sync;

pub use calendar::Calendar;
pub use date_range::DateRange;
pub use error::{ErrorContext, SyncError, SyncResult};
pub use event::{
    Attendee, CalendarEvent, EventIdentity, EventInput, EventKey, EventTime, ParticipationStatus,
};
pub use freebusy::{BusyInterval, CalendarFreeBusy};
pub use provider::{CalendarClient, EventPage, ProviderId};
pub use sync::{CalendarEventSyncItem, SyncDelta, SyncOutcome, SyncStatus};
