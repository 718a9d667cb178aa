use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type TransactionId = Uuid;

/// Maximum description length, counted in Unicode scalar values.
pub const MAX_DESCRIPTION_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Increases the balance
    #[serde(rename = "c")]
    Credit,
    /// Decreases the balance, bounded by the account limit
    #[serde(rename = "d")]
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "c",
            TransactionKind::Debit => "d",
        }
    }

    /// Accepts the wire codes (`c`, `d`) and the long names.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "c" | "credit" => Ok(TransactionKind::Credit),
            "d" | "debit" => Ok(TransactionKind::Debit),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }

    /// Effect of `amount` on the balance.
    pub fn signed(&self, amount: Cents) -> Cents {
        match self {
            TransactionKind::Credit => amount,
            TransactionKind::Debit => -amount,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Credit => write!(f, "credit"),
            TransactionKind::Debit => write!(f, "debit"),
        }
    }
}

/// A validated transaction description of 1 to 10 characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Description(String);

impl Description {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let chars = s.chars().count();
        if chars == 0 || chars > MAX_DESCRIPTION_CHARS {
            return Err(ValidationError::DescriptionLength(chars));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Amounts must be strictly positive; there is no upper bound.
pub fn validate_amount(amount: Cents) -> Result<Cents, ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(amount)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NonPositiveAmount(Cents),
    UnknownKind(String),
    DescriptionLength(usize),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NonPositiveAmount(amount) => {
                write!(f, "amount must be positive, got {}", amount)
            }
            ValidationError::UnknownKind(kind) => {
                write!(f, "kind must be 'c' or 'd', got '{}'", kind)
            }
            ValidationError::DescriptionLength(len) => write!(
                f,
                "description must have 1 to {} characters, got {}",
                MAX_DESCRIPTION_CHARS, len
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// An accepted, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    /// Per-account position in the log, starting at 1
    pub sequence: i64,
    pub kind: TransactionKind,
    /// Amount in cents (always positive)
    pub amount: Cents,
    pub description: Description,
    pub occurred_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction. The sequence number is assigned by the
    /// repository when the entry is appended.
    pub fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Cents,
        description: Description,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            sequence: 0,
            kind,
            amount,
            description,
            occurred_at,
        }
    }

    pub fn signed_amount(&self) -> Cents {
        self.kind.signed(self.amount)
    }
}
