use serde::{Deserialize, Serialize};

use super::TransactionKind;

/// Money is represented as integer cents; balances may be negative.
pub type Cents = i64;

pub type AccountId = i64;

/// A provisioned account. `limit` is the largest overdraft the account may
/// carry, so every stored balance satisfies `balance >= -limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub limit: Cents,
    pub balance: Cents,
}

impl Account {
    pub fn new(id: AccountId, limit: Cents) -> Self {
        Self {
            id,
            limit,
            balance: 0,
        }
    }

    /// Lowest balance this account may reach.
    pub fn floor(&self) -> Cents {
        -self.limit
    }

    /// Compute the balance that applying `amount` of `kind` would leave.
    /// Credits are unbounded above; debits must stay at or above the floor.
    pub fn candidate_balance(
        &self,
        kind: TransactionKind,
        amount: Cents,
    ) -> Result<Cents, BalanceError> {
        match kind {
            TransactionKind::Credit => self
                .balance
                .checked_add(amount)
                .ok_or(BalanceError::Overflow {
                    balance: self.balance,
                    amount,
                }),
            TransactionKind::Debit => match self.balance.checked_sub(amount) {
                Some(candidate) if candidate >= self.floor() => Ok(candidate),
                _ => Err(BalanceError::ExceedsLimit {
                    balance: self.balance,
                    limit: self.limit,
                    requested: amount,
                }),
            },
        }
    }

    pub fn is_within_limit(&self) -> bool {
        self.balance >= self.floor()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    ExceedsLimit {
        balance: Cents,
        limit: Cents,
        requested: Cents,
    },
    /// The resulting balance does not fit in an `i64`.
    Overflow { balance: Cents, amount: Cents },
}

impl std::fmt::Display for BalanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceError::ExceedsLimit {
                balance,
                limit,
                requested,
            } => write!(
                f,
                "debit of {} would take balance {} below the limit of -{}",
                requested, balance, limit
            ),
            BalanceError::Overflow { balance, amount } => {
                write!(f, "crediting {} to balance {} overflows", amount, balance)
            }
        }
    }
}

impl std::error::Error for BalanceError {}
