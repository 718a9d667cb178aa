mod common;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::{provisioning, store_config};
use saldo::application::{LedgerError, LedgerService};
use saldo::config::StoreConfig;
use saldo::domain::{Description, Transaction, TransactionKind};
use saldo::storage::Repository;
use tempfile::TempDir;

async fn provisioned_repo(dir: &TempDir, accounts: &[(i64, i64)]) -> Result<Repository> {
    let repo = Repository::init(&store_config(dir)).await?;
    repo.provision(&provisioning(accounts)).await?;
    Ok(repo)
}

fn entry(account_id: i64, kind: TransactionKind, amount: i64, description: &str) -> Transaction {
    Transaction::new(
        account_id,
        kind,
        amount,
        Description::parse(description).unwrap(),
        Utc::now(),
    )
}

#[tokio::test]
async fn test_provision_is_idempotent() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = provisioned_repo(&temp, &[(1, 100), (2, 200)]).await?;

    let mut t = entry(1, TransactionKind::Credit, 50, "seed");
    assert!(repo.commit_transaction(0, 50, &mut t).await?);

    // Provisioning again keeps balances
    repo.provision(&provisioning(&[(1, 100), (2, 200)])).await?;

    let accounts = repo.list_accounts().await?;
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].balance, 50);
    assert_eq!(accounts[1].limit, 200);

    Ok(())
}

#[tokio::test]
async fn test_limits_are_immutable() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = provisioned_repo(&temp, &[(1, 100)]).await?;

    let err = repo
        .provision(&provisioning(&[(1, 999)]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("limit"), "{}", err);

    assert_eq!(repo.get_account(1).await?.unwrap().limit, 100);
    Ok(())
}

#[tokio::test]
async fn test_unconfigured_accounts_are_refused() -> Result<()> {
    let temp = TempDir::new()?;
    provisioned_repo(&temp, &[(1, 100), (2, 100)]).await?.close().await;

    let result =
        LedgerService::init(&store_config(&temp), &provisioning(&[(1, 100)])).await;
    assert!(matches!(result, Err(LedgerError::Provisioning(_))));
    Ok(())
}

#[tokio::test]
async fn test_conditional_update_detects_stale_balance() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = provisioned_repo(&temp, &[(1, 100)]).await?;

    let mut first = entry(1, TransactionKind::Credit, 10, "one");
    assert!(repo.commit_transaction(0, 10, &mut first).await?);
    assert_eq!(first.sequence, 1);

    // Still believes the balance is 0
    let mut stale = entry(1, TransactionKind::Debit, 100, "stale");
    assert!(!repo.commit_transaction(0, -100, &mut stale).await?);
    assert_eq!(stale.sequence, 0);

    let account = repo.get_account(1).await?.unwrap();
    assert_eq!(account.balance, 10);
    assert_eq!(repo.list_transactions(1).await?, vec![first]);

    Ok(())
}

#[tokio::test]
async fn test_store_refuses_balance_below_limit() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = provisioned_repo(&temp, &[(1, 100)]).await?;

    let mut t = entry(1, TransactionKind::Debit, 101, "bad");
    assert!(repo.commit_transaction(0, -101, &mut t).await.is_err());

    assert_eq!(repo.get_account(1).await?.unwrap().balance, 0);
    assert!(repo.list_transactions(1).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_query_last_order_and_cap() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = provisioned_repo(&temp, &[(1, 0), (2, 0)]).await?;

    let mut balance = 0;
    for i in 1..=5 {
        let mut t = entry(1, TransactionKind::Credit, i, "c");
        assert!(repo.commit_transaction(balance, balance + i, &mut t).await?);
        balance += i;
    }
    let mut other = entry(2, TransactionKind::Credit, 1, "other");
    assert!(repo.commit_transaction(0, 1, &mut other).await?);
    assert_eq!(other.sequence, 1);

    let last = repo.query_last(1, 3).await?;
    let amounts: Vec<i64> = last.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![5, 4, 3]);

    assert_eq!(repo.query_last(1, 100).await?.len(), 5);
    assert!(repo.query_last(3, 10).await?.is_empty());

    let (account, recent) = repo.read_statement(1, 2).await?.unwrap();
    assert_eq!(account.balance, 15);
    assert_eq!(recent[0].sequence, 5);
    assert!(repo.read_statement(9, 2).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_log_is_append_only() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = provisioned_repo(&temp, &[(1, 0)]).await?;
    let mut t = entry(1, TransactionKind::Credit, 10, "keep");
    assert!(repo.commit_transaction(0, 10, &mut t).await?);
    repo.close().await;

    let pool = sqlx::SqlitePool::connect(&store_config(&temp).database_url).await?;
    assert!(sqlx::query("DELETE FROM transactions")
        .execute(&pool)
        .await
        .is_err());
    assert!(sqlx::query("UPDATE transactions SET amount = 1")
        .execute(&pool)
        .await
        .is_err());
    pool.close().await;

    let repo = Repository::connect(&store_config(&temp)).await?;
    assert_eq!(repo.list_transactions(1).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_connect_gives_up_after_bounded_attempts() -> Result<()> {
    let temp = TempDir::new()?;
    let missing = temp.path().join("no-such-dir").join("ledger.db");
    let config = StoreConfig {
        connect_attempts: 3,
        connect_backoff: Duration::from_millis(5),
        ..StoreConfig::for_path(missing.to_str().unwrap())
    };

    let started = std::time::Instant::now();
    let result = LedgerService::init(&config, &provisioning(&[(1, 0)])).await;

    assert!(matches!(
        result,
        Err(LedgerError::TransientStorageFailure(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn test_integrity_report_over_stored_ledgers() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = provisioned_repo(&temp, &[(1, 50), (2, 0)]).await?;

    let mut a = entry(1, TransactionKind::Debit, 30, "a");
    assert!(repo.commit_transaction(0, -30, &mut a).await?);
    let mut b = entry(1, TransactionKind::Credit, 5, "b");
    assert!(repo.commit_transaction(-30, -25, &mut b).await?);

    let ledgers = repo.load_ledgers().await?;
    assert_eq!(ledgers.len(), 2);
    assert_eq!(ledgers[0].last_sequence, 2);
    assert_eq!(ledgers[0].transactions.len(), 2);
    assert!(ledgers[1].transactions.is_empty());

    let report = saldo::domain::build_integrity_report(&ledgers);
    assert!(report.is_healthy(), "{:?}", report.issues);
    Ok(())
}
