use std::collections::HashMap;
use std::future::Future;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::config::{EngineConfig, Provisioning, StoreConfig};
use crate::domain::{
    build_integrity_report, validate_amount, Account, AccountId, Cents, Description,
    IntegrityReport, Statement, Transaction, TransactionKind, STATEMENT_LENGTH,
};
use crate::storage::Repository;

use super::LedgerError;

/// The ledger engine. Applies transactions and reads statements for the
/// fixed account set, serializing work per account.
///
/// Every account has its own lock: `apply` holds it exclusively from the
/// balance read until the new balance and log entry are committed, and
/// `snapshot` holds it shared while reading. Accounts never share a lock,
/// and the store's conditional update keeps concurrent writers from other
/// processes from losing updates.
pub struct LedgerService {
    repo: Repository,
    accounts: HashMap<AccountId, RwLock<()>>,
    config: EngineConfig,
}

/// A transaction as submitted by a caller, before validation.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub kind: String,
    pub amount: Cents,
    pub description: String,
}

impl TransactionRequest {
    pub fn new(kind: impl Into<String>, amount: Cents, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            amount,
            description: description.into(),
        }
    }

    pub fn credit(amount: Cents, description: impl Into<String>) -> Self {
        Self::new(TransactionKind::Credit.as_str(), amount, description)
    }

    pub fn debit(amount: Cents, description: impl Into<String>) -> Self {
        Self::new(TransactionKind::Debit.as_str(), amount, description)
    }
}

/// Result of an accepted transaction
#[derive(Debug, Clone)]
pub struct Applied {
    pub balance: Cents,
    pub limit: Cents,
    pub transaction: Transaction,
}

impl LedgerService {
    /// Create the engine over an already provisioned repository. The account
    /// set is read once here and never changes afterwards.
    pub async fn new(repo: Repository, config: EngineConfig) -> Result<Self, LedgerError> {
        let accounts = repo
            .list_accounts()
            .await?
            .into_iter()
            .map(|account| (account.id, RwLock::new(())))
            .collect();

        Ok(Self {
            repo,
            accounts,
            config,
        })
    }

    /// Connect, migrate and provision, then build the engine.
    pub async fn init(
        store: &StoreConfig,
        provisioning: &Provisioning,
    ) -> Result<Self, LedgerError> {
        Self::init_with(store, provisioning, EngineConfig::default()).await
    }

    pub async fn init_with(
        store: &StoreConfig,
        provisioning: &Provisioning,
        config: EngineConfig,
    ) -> Result<Self, LedgerError> {
        provisioning.validate().map_err(LedgerError::Provisioning)?;

        let repo = Repository::init(store).await?;
        if let Err(err) = repo.provision(provisioning).await {
            repo.close().await;
            return Err(LedgerError::Provisioning(err));
        }

        Self::new(repo, config).await
    }

    /// Release the storage connections.
    pub async fn close(&self) {
        self.repo.close().await;
    }

    /// Provisioned account IDs in ascending order.
    pub fn account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_provisioned(&self, account_id: AccountId) -> bool {
        self.accounts.contains_key(&account_id)
    }

    // ========================
    // Ledger operations
    // ========================

    /// Validate and apply one transaction.
    ///
    /// Checks run in order: account, amount, kind, description. A rejection
    /// never changes the account. On acceptance the new balance and the log
    /// entry become visible together and the post-update balance and limit
    /// are returned.
    pub async fn apply(
        &self,
        account_id: AccountId,
        request: &TransactionRequest,
    ) -> Result<Applied, LedgerError> {
        let lock = self.lock_for(account_id)?;
        let amount = validate_amount(request.amount)?;
        let kind = TransactionKind::parse(&request.kind)?;
        let description = Description::parse(&request.description)?;

        let _guard = self.acquire(account_id, lock.write()).await?;

        for retry in 0..=self.config.max_conflict_retries {
            let account = self
                .repo
                .get_account(account_id)
                .await?
                .ok_or(LedgerError::NotFound(account_id))?;

            let new_balance = account
                .candidate_balance(kind, amount)
                .map_err(|err| {
                    log::info!("Rejected {} on account {}: {}", kind, account_id, err);
                    LedgerError::from_balance(account_id, err)
                })?;

            let mut transaction =
                Transaction::new(account_id, kind, amount, description.clone(), Utc::now());

            if self
                .repo
                .commit_transaction(account.balance, new_balance, &mut transaction)
                .await?
            {
                log::debug!(
                    "Account {}: {} of {} accepted as #{}, balance {} -> {}",
                    account_id,
                    kind,
                    amount,
                    transaction.sequence,
                    account.balance,
                    new_balance
                );
                return Ok(Applied {
                    balance: new_balance,
                    limit: account.limit,
                    transaction,
                });
            }

            log::warn!(
                "Account {} changed under a concurrent writer (retry {}), re-reading",
                account_id,
                retry
            );
        }

        Err(LedgerError::TransientStorageFailure(anyhow!(
            "Account {} kept changing after {} retries",
            account_id,
            self.config.max_conflict_retries
        )))
    }

    /// Read balance, limit and the most recent transactions as of one
    /// instant. Never observes half of a concurrent `apply`.
    pub async fn snapshot(&self, account_id: AccountId) -> Result<Statement, LedgerError> {
        let lock = self.lock_for(account_id)?;
        let _guard = self.acquire(account_id, lock.read()).await?;

        let (account, transactions) = self
            .repo
            .read_statement(account_id, STATEMENT_LENGTH)
            .await?
            .ok_or(LedgerError::NotFound(account_id))?;

        Ok(Statement::new(account, transactions, Utc::now()))
    }

    /// Current state of every provisioned account.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.repo.list_accounts().await?)
    }

    /// Verify every account's balance, limit and sequence against its log.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let ledgers = self.repo.load_ledgers().await?;
        Ok(build_integrity_report(&ledgers))
    }

    fn lock_for(&self, account_id: AccountId) -> Result<&RwLock<()>, LedgerError> {
        self.accounts
            .get(&account_id)
            .ok_or(LedgerError::NotFound(account_id))
    }

    async fn acquire<G>(
        &self,
        account_id: AccountId,
        guard: impl Future<Output = G>,
    ) -> Result<G, LedgerError> {
        tokio::time::timeout(self.config.lock_timeout, guard)
            .await
            .map_err(|_| {
                log::warn!(
                    "Timed out after {:?} waiting for account {}",
                    self.config.lock_timeout,
                    account_id
                );
                LedgerError::TransientStorageFailure(anyhow!(
                    "Timed out waiting for account {}",
                    account_id
                ))
            })
    }
}
