use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Cents};

/// One provisioned account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: AccountId,
    pub limit: Cents,
}

/// The fixed account set, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provisioning {
    pub accounts: Vec<AccountConfig>,
}

impl Provisioning {
    /// Accounts 1..=5 of the reference deployment.
    pub fn reference() -> Self {
        let limits = [100_000, 80_000, 1_000_000, 10_000_000, 500_000];
        Self {
            accounts: (1..)
                .zip(limits)
                .map(|(id, limit)| AccountConfig { id, limit })
                .collect(),
        }
    }

    /// Load and validate a JSON file of the form
    /// `{"accounts": [{"id": 1, "limit": 100000}, ...]}`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read accounts file {}", path.display()))?;
        let provisioning: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid accounts file {}", path.display()))?;
        provisioning.validate()?;
        Ok(provisioning)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            bail!("At least one account must be provisioned");
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.id <= 0 {
                bail!("Account id must be positive, got {}", account.id);
            }
            if account.limit < 0 {
                bail!(
                    "Account {} has negative limit {}",
                    account.id,
                    account.limit
                );
            }
            if !seen.insert(account.id) {
                bail!("Account {} is provisioned twice", account.id);
            }
        }
        Ok(())
    }
}

/// Connection settings for the backing store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Longest wait for a pooled connection
    pub acquire_timeout: Duration,
    /// Longest wait on a locked database before SQLite gives up
    pub busy_timeout: Duration,
    /// Connection attempts at startup before giving up
    pub connect_attempts: u32,
    /// Delay after the first failed attempt; doubles up to `max_backoff`
    pub connect_backoff: Duration,
    pub max_backoff: Duration,
}

impl StoreConfig {
    /// Settings for a SQLite database file, created if missing.
    pub fn for_path(database_path: &str) -> Self {
        Self {
            database_url: format!("sqlite:{}", database_path),
            ..Self::default()
        }
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:saldo.db".to_string(),
            max_connections: 16,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            connect_attempts: 10,
            connect_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Tuning for the ledger engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest wait for an account's critical section
    pub lock_timeout: Duration,
    /// Conditional updates that lose to another writer are re-read and
    /// retried at most this many times.
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            max_conflict_retries: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_reference_accounts() {
        let reference = Provisioning::reference();
        assert!(reference.validate().is_ok());
        assert_eq!(reference.accounts.len(), 5);
        assert_eq!(
            reference.accounts[0],
            AccountConfig {
                id: 1,
                limit: 100_000
            }
        );
        assert_eq!(reference.accounts[4].id, 5);
    }

    #[test]
    fn test_rejects_duplicates_and_negative_limits() {
        let dup = Provisioning {
            accounts: vec![
                AccountConfig { id: 1, limit: 10 },
                AccountConfig { id: 1, limit: 20 },
            ],
        };
        assert!(dup.validate().is_err());

        let negative = Provisioning {
            accounts: vec![AccountConfig { id: 1, limit: -1 }],
        };
        assert!(negative.validate().is_err());

        let bad_id = Provisioning {
            accounts: vec![AccountConfig { id: 0, limit: 1 }],
        };
        assert!(bad_id.validate().is_err());

        assert!(Provisioning { accounts: vec![] }.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"accounts": [{{"id": 7, "limit": 0}}, {{"id": 9, "limit": 500}}]}}"#
        )
        .unwrap();

        let provisioning = Provisioning::from_file(file.path()).unwrap();
        assert_eq!(
            provisioning.accounts,
            vec![
                AccountConfig { id: 7, limit: 0 },
                AccountConfig { id: 9, limit: 500 },
            ]
        );
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"accounts": [{{"id": 1, "limit": -5}}]}}"#).unwrap();
        assert!(Provisioning::from_file(file.path()).is_err());
    }

    #[test]
    fn test_store_config_for_path() {
        let config = StoreConfig::for_path("/tmp/ledger.db").with_connect_attempts(1);
        assert_eq!(config.database_url, "sqlite:/tmp/ledger.db");
        assert_eq!(config.connect_attempts, 1);
    }
}
