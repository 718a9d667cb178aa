use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Account, AccountId, Cents, Transaction};

/// Number of entries shown on a statement.
pub const STATEMENT_LENGTH: usize = 10;

/// A consistent view of an account: every listed transaction is already
/// reflected in `balance`, and `balance` reflects nothing that is missing
/// from the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub account_id: AccountId,
    pub balance: Cents,
    pub limit: Cents,
    pub as_of: DateTime<Utc>,
    /// Most recent first
    pub transactions: Vec<Transaction>,
}

impl Statement {
    pub fn new(account: Account, transactions: Vec<Transaction>, as_of: DateTime<Utc>) -> Self {
        debug_assert!(
            transactions
                .windows(2)
                .all(|pair| pair[0].sequence > pair[1].sequence),
            "statement entries must be in descending sequence order"
        );
        Self {
            account_id: account.id,
            balance: account.balance,
            limit: account.limit,
            as_of,
            transactions,
        }
    }

    /// Sequence of the newest entry, or 0 for an untouched account.
    pub fn last_sequence(&self) -> i64 {
        self.transactions.first().map(|t| t.sequence).unwrap_or(0)
    }
}
