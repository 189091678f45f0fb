//! Normalized calendar metadata.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// A calendar within one provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    /// Provider-scoped calendar id.
    pub id: String,
    /// Engine-side account identifier.
    pub account_id: String,
    pub provider: ProviderId,
    /// Provider-side account identifier (usually the account email).
    pub provider_account_id: String,
    pub name: String,
    /// The calendar's default zone, when the provider reports one.
    pub time_zone: Option<Tz>,
    pub primary: bool,
    /// True when the account only has reader access.
    pub read_only: bool,
}
