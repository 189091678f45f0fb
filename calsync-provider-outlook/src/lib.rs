//! Microsoft Outlook calendar provider for calsync.
//!
//! Talks to the Microsoft Graph REST API and normalizes its event shapes
//! into the provider-neutral `calsync-core` types. Incremental sync uses
//! `calendarView/delta` with `@odata.nextLink`/`@odata.deltaLink`; Graph
//! materializes recurring series per-instance in deltas, so no master
//! expansion pass is needed on this provider.

mod client;
mod config;
mod convert;
mod wire;

pub use client::OutlookClient;
pub use config::OutlookConfig;
