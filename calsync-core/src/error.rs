//! Error taxonomy shared across providers and the engine.
//!
//! Provider-call failures are classified and wrapped exactly once, at the
//! provider boundary, then propagate unchanged through the reconciler and
//! the mutation coordinator.

use thiserror::Error;

use crate::provider::ProviderId;

/// Errors that can occur in calsync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport failure: connection refused, DNS, timeout.
    #[error("network error in {operation} ({provider}/{account_id}): {message}")]
    Network {
        provider: ProviderId,
        account_id: String,
        operation: &'static str,
        message: String,
    },

    /// Target calendar, account, or event is missing on the provider side.
    #[error("{resource} not found in {operation} ({provider}/{account_id})")]
    NotFound {
        provider: ProviderId,
        account_id: String,
        operation: &'static str,
        resource: String,
    },

    /// The stored sync token was rejected; a full resync is required.
    /// The reconciler handles this internally and never surfaces it.
    #[error("sync token expired for calendar {calendar_id} ({provider}/{account_id})")]
    SyncTokenExpired {
        provider: ProviderId,
        account_id: String,
        calendar_id: String,
    },

    /// Any other provider-reported failure.
    #[error("provider error in {operation} ({provider}/{account_id}): {message}")]
    Provider {
        provider: ProviderId,
        account_id: String,
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    pub fn is_token_expired(&self) -> bool {
        matches!(self, SyncError::SyncTokenExpired { .. })
    }
}

/// Result type alias for calsync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Uniform error wrapper for one provider call.
///
/// Both provider crates route every failure through one of these methods,
/// so errors always carry the provider id, account id, and operation name.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub provider: ProviderId,
    pub account_id: &'a str,
    pub operation: &'static str,
}

impl ErrorContext<'_> {
    /// A failure from the transport itself (the request never completed).
    pub fn transport(&self, err: reqwest::Error) -> SyncError {
        SyncError::Network {
            provider: self.provider,
            account_id: self.account_id.to_string(),
            operation: self.operation,
            message: err.to_string(),
        }
    }

    /// The provider answered, but the body was not what we expected.
    pub fn decode(&self, err: reqwest::Error) -> SyncError {
        SyncError::Provider {
            provider: self.provider,
            account_id: self.account_id.to_string(),
            operation: self.operation,
            status: None,
            message: format!("invalid response body: {err}"),
        }
    }

    pub fn not_found(&self, resource: impl Into<String>) -> SyncError {
        SyncError::NotFound {
            provider: self.provider,
            account_id: self.account_id.to_string(),
            operation: self.operation,
            resource: resource.into(),
        }
    }

    pub fn token_expired(&self, calendar_id: impl Into<String>) -> SyncError {
        SyncError::SyncTokenExpired {
            provider: self.provider,
            account_id: self.account_id.to_string(),
            calendar_id: calendar_id.into(),
        }
    }

    pub fn provider(&self, status: Option<u16>, message: impl Into<String>) -> SyncError {
        SyncError::Provider {
            provider: self.provider,
            account_id: self.account_id.to_string(),
            operation: self.operation,
            status,
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status. 404 becomes `NotFound`; callers that
    /// can hit token expiry (410) handle that status before calling this.
    pub fn from_status(&self, status: u16, resource: &str, body: &str) -> SyncError {
        match status {
            404 => self.not_found(resource),
            _ => self.provider(Some(status), body),
        }
    }
}
