//! Shared constants.

/// Default sync window: events within ±this many days of now are fetched
/// when the caller gives no explicit range.
pub const DEFAULT_SYNC_DAYS: i64 = 365;

/// Page size requested from providers. Both Google and Graph cap pages
/// server-side anyway; this keeps page walks bounded and predictable.
pub const EVENTS_PAGE_SIZE: u32 = 250;

/// Upper bound on events fetched per calendar in one list request. The
/// aggregator re-sorts the full set on every read, so the dataset has to
/// stay bounded.
pub const EVENTS_FETCH_CAP: usize = 2500;
