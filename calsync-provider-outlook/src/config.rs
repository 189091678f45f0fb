//! Connection settings for one Microsoft account.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for a single connected Microsoft account.
///
/// Token acquisition and refresh live outside this crate; the embedder
/// hands us a valid bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlookConfig {
    /// Engine-side account identifier (key in the client map).
    pub account_id: String,
    /// The Microsoft account email (UPN).
    pub provider_account_id: String,
    /// OAuth 2.0 bearer token for Graph.
    pub access_token: String,
    /// API endpoint; overridable for tests.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
