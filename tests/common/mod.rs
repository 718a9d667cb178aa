// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use saldo::application::LedgerService;
use saldo::config::{AccountConfig, EngineConfig, Provisioning, StoreConfig};
use saldo::domain::{AccountId, Cents};
use tempfile::TempDir;

/// Store settings for a database file inside `dir`.
pub fn store_config(dir: &TempDir) -> StoreConfig {
    let db_path = dir.path().join("test.db");
    StoreConfig::for_path(db_path.to_str().unwrap()).with_connect_attempts(1)
}

pub fn provisioning(accounts: &[(AccountId, Cents)]) -> Provisioning {
    Provisioning {
        accounts: accounts
            .iter()
            .map(|&(id, limit)| AccountConfig { id, limit })
            .collect(),
    }
}

/// Helper to create a test service over the reference accounts 1..=5
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&store_config(&temp_dir), &Provisioning::reference()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service over the given `(id, limit)` accounts
pub async fn test_service_with(accounts: &[(AccountId, Cents)]) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&store_config(&temp_dir), &provisioning(accounts)).await?;
    Ok((service, temp_dir))
}

/// Open a second engine on an existing database, as another process would.
pub async fn open_again(
    dir: &TempDir,
    accounts: &[(AccountId, Cents)],
    config: EngineConfig,
) -> Result<LedgerService> {
    Ok(LedgerService::init_with(&store_config(dir), &provisioning(accounts), config).await?)
}
