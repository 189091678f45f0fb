//! Google Calendar provider for calsync.
//!
//! Talks to the Calendar v3 REST API directly and normalizes its event
//! shapes into the provider-neutral `calsync-core` types. Incremental sync
//! uses `events.list` with `syncToken`/`pageToken`; a rejected token (410
//! Gone) is surfaced as `SyncError::SyncTokenExpired` for the reconciler
//! to handle.

mod client;
mod config;
mod convert;
mod wire;

pub use client::GoogleClient;
pub use config::GoogleConfig;
