//! Engine configuration.
//!
//! One TOML document lists the connected accounts; each entry is tagged
//! with its provider and deserializes straight into that provider crate's
//! config struct.
//!
//! ```toml
//! [[accounts]]
//! provider = "google"
//! account_id = "work"
//! provider_account_id = "me@example.com"
//! access_token = "ya29..."
//!
//! [[accounts]]
//! provider = "microsoft"
//! account_id = "personal"
//! provider_account_id = "me@outlook.com"
//! access_token = "EwB..."
//! ```

use std::path::Path;

use calsync_core::{SyncError, SyncResult};
use calsync_provider_google::GoogleConfig;
use calsync_provider_outlook::OutlookConfig;
use serde::Deserialize;

/// One connected account, tagged by provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum AccountConfig {
    Google(GoogleConfig),
    Microsoft(OutlookConfig),
}

impl AccountConfig {
    pub fn account_id(&self) -> &str {
        match self {
            AccountConfig::Google(c) => &c.account_id,
            AccountConfig::Microsoft(c) => &c.account_id,
        }
    }
}

/// The full engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl EngineConfig {
    pub fn from_toml(input: &str) -> SyncResult<Self> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| SyncError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    fn validate(&self) -> SyncResult<()> {
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            let id = account.account_id();
            if id.is_empty() {
                return Err(SyncError::Config("account_id must not be empty".into()));
            }
            if !seen.insert(id) {
                return Err(SyncError::Config(format!("duplicate account_id: {id}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_mixed_account_list() {
        let config = EngineConfig::from_toml(
            r#"
            [[accounts]]
            provider = "google"
            account_id = "work"
            provider_account_id = "me@example.com"
            access_token = "tok-g"

            [[accounts]]
            provider = "microsoft"
            account_id = "personal"
            provider_account_id = "me@outlook.com"
            access_token = "tok-m"
            "#,
        )
        .unwrap();

        assert_eq!(config.accounts.len(), 2);
        assert!(matches!(config.accounts[0], AccountConfig::Google(_)));
        assert!(matches!(config.accounts[1], AccountConfig::Microsoft(_)));
        assert_eq!(config.accounts[1].account_id(), "personal");
    }

    #[test]
    fn rejects_duplicate_account_ids() {
        let err = EngineConfig::from_toml(
            r#"
            [[accounts]]
            provider = "google"
            account_id = "work"
            provider_account_id = "a@example.com"
            access_token = "t1"

            [[accounts]]
            provider = "google"
            account_id = "work"
            provider_account_id = "b@example.com"
            access_token = "t2"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn rejects_unknown_providers() {
        let err = EngineConfig::from_toml(
            r#"
            [[accounts]]
            provider = "caldav"
            account_id = "home"
            access_token = "t"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, SyncError::Config(_)));
    }
}
