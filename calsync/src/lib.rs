//! Calendar sync engine.
//!
//! Keeps a locally cached view of events consistent with N remote provider
//! accounts while letting callers mutate the view optimistically before the
//! remote write is confirmed. Data flows one way: provider clients feed the
//! reconciler, the reconciler feeds the aggregator and the confirmed cache,
//! and the optimistic projection overlays pending actions on every read.
//!
//! The engine never polls on its own; syncs and list fetches are triggered
//! by the caller (on mount, refocus, or reconnect).

pub mod aggregate;
pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod mutation;
pub mod optimistic;
pub mod projection;
pub mod reconcile;
pub mod scope;

pub use aggregate::{AggregatedEvents, aggregate};
pub use cache::{CacheSnapshot, ConfirmedCache};
pub use client::ProviderClient;
pub use config::{AccountConfig, EngineConfig};
pub use engine::{ListedEvents, SyncEngine};
pub use mutation::MutationCoordinator;
pub use optimistic::{OptimisticAction, OptimisticStore};
pub use projection::apply as project;
pub use scope::{FetchRegistry, FetchTicket, Invalidator, NullInvalidator, QueryScope};
