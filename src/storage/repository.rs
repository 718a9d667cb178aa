use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::config::{Provisioning, StoreConfig};
use crate::domain::{
    Account, AccountId, AccountLedger, Cents, Description, Transaction, TransactionKind,
};

use super::MIGRATION_001_INITIAL;

/// Repository for the account store and the transaction log.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database, retrying with exponential backoff up to
    /// `config.connect_attempts` times.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let attempts = config.connect_attempts.max(1);
        let mut backoff = config.connect_backoff;
        let mut attempt = 1;

        loop {
            match Self::open_pool(config).await {
                Ok(pool) => {
                    log::info!("Connected to {}", config.database_url);
                    return Ok(Self::new(pool));
                }
                Err(err) if attempt < attempts => {
                    log::warn!(
                        "Failed to connect to {} (attempt {}/{}): {:#}; retrying in {:?}",
                        config.database_url,
                        attempt,
                        attempts,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(config.max_backoff);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "Giving up on {} after {} attempts",
                        config.database_url, attempts
                    )));
                }
            }
        }
    }

    async fn open_pool(config: &StoreConfig) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .context("Invalid database url")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .context("Failed to connect to database")
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize the database (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Close every pooled connection. Pending operations fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Account store
    // ========================

    /// Insert the configured accounts if they are missing. Provisioning is
    /// idempotent, but an existing account keeps its limit forever and the
    /// database may not hold accounts the configuration does not name.
    pub async fn provision(&self, provisioning: &Provisioning) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin provisioning")?;

        for config in &provisioning.accounts {
            sqlx::query(
                r#"
                INSERT INTO accounts (id, "limit", balance, last_sequence)
                VALUES (?, ?, 0, 0)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(config.id)
            .bind(config.limit)
            .execute(&mut *tx)
            .await
            .context("Failed to provision account")?;

            let stored: Cents = sqlx::query(r#"SELECT "limit" FROM accounts WHERE id = ?"#)
                .bind(config.id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to read provisioned account")?
                .get("limit");

            if stored != config.limit {
                bail!(
                    "Account {} is provisioned with limit {} but configured with {}",
                    config.id,
                    stored,
                    config.limit
                );
            }
        }

        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM accounts")
            .fetch_one(&mut *tx)
            .await
            .context("Failed to count accounts")?
            .get("count");
        if count != provisioning.accounts.len() as i64 {
            bail!(
                "Database holds {} accounts but {} are configured",
                count,
                provisioning.accounts.len()
            );
        }

        tx.commit().await.context("Failed to commit provisioning")?;
        Ok(())
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Self::fetch_account(&self.pool, id).await
    }

    /// List all accounts, ordered by ID.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(r#"SELECT id, "limit", balance FROM accounts ORDER BY id"#)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list accounts")?;

        Ok(rows.iter().map(Self::row_to_account).collect())
    }

    /// Replace the balance of `transaction.account_id` with `new_balance`
    /// only if it still equals `expected_balance`, and append `transaction`
    /// in the same database transaction. Assigns the next sequence number.
    ///
    /// Returns `false` without changing anything when the balance moved
    /// since it was read.
    pub async fn commit_transaction(
        &self,
        expected_balance: Cents,
        new_balance: Cents,
        transaction: &mut Transaction,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let sequence = Self::compare_and_swap_balance(
            &mut *tx,
            transaction.account_id,
            expected_balance,
            new_balance,
        )
        .await?;

        let Some(sequence) = sequence else {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(false);
        };

        transaction.sequence = sequence;
        Self::append_transaction(&mut *tx, transaction).await?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(true)
    }

    /// The conditional-update primitive. Returns the bumped sequence counter
    /// on success, `None` if the stored balance differs from `expected`.
    async fn compare_and_swap_balance(
        conn: &mut SqliteConnection,
        account_id: AccountId,
        expected: Cents,
        new_balance: Cents,
    ) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = ?, last_sequence = last_sequence + 1
            WHERE id = ? AND balance = ?
            RETURNING last_sequence
            "#,
        )
        .bind(new_balance)
        .bind(account_id)
        .bind(expected)
        .fetch_optional(conn)
        .await
        .context("Failed to update balance")?;

        Ok(row.map(|row| row.get("last_sequence")))
    }

    fn row_to_account(row: &SqliteRow) -> Account {
        Account {
            id: row.get("id"),
            limit: row.get("limit"),
            balance: row.get("balance"),
        }
    }

    async fn fetch_account<'e, E>(executor: E, id: AccountId) -> Result<Option<Account>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(r#"SELECT id, "limit", balance FROM accounts WHERE id = ?"#)
            .bind(id)
            .fetch_optional(executor)
            .await
            .context("Failed to fetch account")?;

        Ok(row.as_ref().map(Self::row_to_account))
    }

    // ========================
    // Transaction log
    // ========================

    async fn append_transaction(
        conn: &mut SqliteConnection,
        transaction: &Transaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, account_id, sequence, kind, amount, description, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.account_id)
        .bind(transaction.sequence)
        .bind(transaction.kind.as_str())
        .bind(transaction.amount)
        .bind(transaction.description.as_str())
        .bind(transaction.occurred_at.to_rfc3339())
        .execute(conn)
        .await
        .context("Failed to append transaction")?;
        Ok(())
    }

    /// The `n` most recent transactions for an account, newest first.
    pub async fn query_last(&self, account_id: AccountId, n: usize) -> Result<Vec<Transaction>> {
        Self::fetch_last(&self.pool, account_id, n).await
    }

    async fn fetch_last<'e, E>(executor: E, account_id: AccountId, n: usize) -> Result<Vec<Transaction>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, sequence, kind, amount, description, occurred_at
            FROM transactions
            WHERE account_id = ?
            ORDER BY sequence DESC
            LIMIT ?
            "#,
        )
        .bind(account_id)
        .bind(i64::try_from(n).unwrap_or(i64::MAX))
        .fetch_all(executor)
        .await
        .context("Failed to query recent transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// The whole log of an account, oldest first.
    pub async fn list_transactions(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, sequence, kind, amount, description, occurred_at
            FROM transactions
            WHERE account_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Read an account and its `n` most recent transactions from a single
    /// database snapshot.
    pub async fn read_statement(
        &self,
        account_id: AccountId,
        n: usize,
    ) -> Result<Option<(Account, Vec<Transaction>)>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin statement read")?;

        let Some(account) = Self::fetch_account(&mut *tx, account_id).await? else {
            return Ok(None);
        };
        let transactions = Self::fetch_last(&mut *tx, account_id, n).await?;

        tx.commit().await.context("Failed to finish statement read")?;
        Ok(Some((account, transactions)))
    }

    /// Load every account with its sequence counter and full log, all from
    /// one database snapshot.
    pub async fn load_ledgers(&self) -> Result<Vec<AccountLedger>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin integrity read")?;

        let accounts = sqlx::query(
            r#"SELECT id, "limit", balance, last_sequence FROM accounts ORDER BY id"#,
        )
        .fetch_all(&mut *tx)
        .await
        .context("Failed to load accounts")?;

        let rows = sqlx::query(
            r#"
            SELECT id, account_id, sequence, kind, amount, description, occurred_at
            FROM transactions
            ORDER BY account_id, sequence
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .context("Failed to load transactions")?;

        tx.commit().await.context("Failed to finish integrity read")?;

        let mut ledgers: Vec<AccountLedger> = accounts
            .iter()
            .map(|row| AccountLedger {
                account: Self::row_to_account(row),
                last_sequence: row.get("last_sequence"),
                transactions: Vec::new(),
            })
            .collect();

        for row in &rows {
            let transaction = Self::row_to_transaction(row)?;
            if let Some(ledger) = ledgers
                .iter_mut()
                .find(|l| l.account.id == transaction.account_id)
            {
                ledger.transactions.push(transaction);
            }
        }

        Ok(ledgers)
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let kind_str: String = row.get("kind");
        let description_str: String = row.get("description");
        let occurred_at_str: String = row.get("occurred_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            account_id: row.get("account_id"),
            sequence: row.get("sequence"),
            kind: TransactionKind::parse(&kind_str)
                .with_context(|| format!("Invalid transaction kind: {}", kind_str))?,
            amount: row.get("amount"),
            description: Description::parse(&description_str)
                .with_context(|| format!("Invalid stored description: {}", description_str))?,
            occurred_at: DateTime::parse_from_rfc3339(&occurred_at_str)
                .context("Invalid occurred_at timestamp")?
                .with_timezone(&Utc),
        })
    }
}
