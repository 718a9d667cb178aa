use thiserror::Error;

use crate::domain::{AccountId, BalanceError, Cents, ValidationError};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Insufficient limit on account {account_id}: balance {balance}, limit {limit}, debit {requested}"
    )]
    InsufficientLimit {
        account_id: AccountId,
        balance: Cents,
        limit: Cents,
        requested: Cents,
    },

    #[error("Storage unavailable: {0:#}")]
    TransientStorageFailure(#[from] anyhow::Error),

    #[error("Provisioning failed: {0:#}")]
    Provisioning(#[source] anyhow::Error),
}

impl LedgerError {
    /// Deterministic rejections leave the account untouched and are safe to
    /// report to the caller as-is.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound(_)
                | LedgerError::InvalidInput(_)
                | LedgerError::InsufficientLimit { .. }
        )
    }

    pub(crate) fn from_balance(account_id: AccountId, err: BalanceError) -> Self {
        match err {
            BalanceError::ExceedsLimit {
                balance,
                limit,
                requested,
            } => LedgerError::InsufficientLimit {
                account_id,
                balance,
                limit,
                requested,
            },
            overflow @ BalanceError::Overflow { .. } => {
                LedgerError::InvalidInput(overflow.to_string())
            }
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::InvalidInput(err.to_string())
    }
}
