use super::{Account, AccountId, Cents, Transaction};

/// Replay a full account log (in any order) into the balance it implies.
/// `None` when an intermediate sum does not fit in `Cents`.
pub fn replay_balance(transactions: &[Transaction]) -> Option<Cents> {
    transactions
        .iter()
        .try_fold(0 as Cents, |balance, t| balance.checked_add(t.signed_amount()))
}

/// Everything the integrity check needs to know about one account.
#[derive(Debug, Clone)]
pub struct AccountLedger {
    pub account: Account,
    /// Sequence counter stored alongside the balance
    pub last_sequence: i64,
    /// Whole log, ascending sequence
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    BalanceMismatch {
        account_id: AccountId,
        stored: Cents,
        replayed: Cents,
    },
    LimitBreached {
        account_id: AccountId,
        balance: Cents,
        limit: Cents,
    },
    ReplayOverflow {
        account_id: AccountId,
    },
    SequenceGap {
        account_id: AccountId,
        expected: i64,
        found: i64,
    },
    SequenceCounterMismatch {
        account_id: AccountId,
        counter: i64,
        entries: i64,
    },
    NonPositiveAmount {
        account_id: AccountId,
        sequence: i64,
        amount: Cents,
    },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::BalanceMismatch {
                account_id,
                stored,
                replayed,
            } => write!(
                f,
                "account {}: stored balance {} but log sums to {}",
                account_id, stored, replayed
            ),
            IntegrityIssue::ReplayOverflow { account_id } => write!(
                f,
                "account {}: log sum does not fit in a balance",
                account_id
            ),
            IntegrityIssue::LimitBreached {
                account_id,
                balance,
                limit,
            } => write!(
                f,
                "account {}: balance {} is below the limit of -{}",
                account_id, balance, limit
            ),
            IntegrityIssue::SequenceGap {
                account_id,
                expected,
                found,
            } => write!(
                f,
                "account {}: expected sequence {}, found {}",
                account_id, expected, found
            ),
            IntegrityIssue::SequenceCounterMismatch {
                account_id,
                counter,
                entries,
            } => write!(
                f,
                "account {}: sequence counter is {} but the log has {} entries",
                account_id, counter, entries
            ),
            IntegrityIssue::NonPositiveAmount {
                account_id,
                sequence,
                amount,
            } => write!(
                f,
                "account {}: entry {} has non-positive amount {}",
                account_id, sequence, amount
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every account's stored state against its log.
pub fn build_integrity_report(ledgers: &[AccountLedger]) -> IntegrityReport {
    let mut report = IntegrityReport {
        account_count: ledgers.len(),
        ..Default::default()
    };

    for ledger in ledgers {
        let account = &ledger.account;
        report.transaction_count += ledger.transactions.len();

        match replay_balance(&ledger.transactions) {
            Some(replayed) if replayed != account.balance => {
                report.issues.push(IntegrityIssue::BalanceMismatch {
                    account_id: account.id,
                    stored: account.balance,
                    replayed,
                });
            }
            Some(_) => {}
            None => report.issues.push(IntegrityIssue::ReplayOverflow {
                account_id: account.id,
            }),
        }

        if !account.is_within_limit() {
            report.issues.push(IntegrityIssue::LimitBreached {
                account_id: account.id,
                balance: account.balance,
                limit: account.limit,
            });
        }

        for (expected, t) in (1..).zip(&ledger.transactions) {
            if t.sequence != expected {
                report.issues.push(IntegrityIssue::SequenceGap {
                    account_id: account.id,
                    expected,
                    found: t.sequence,
                });
                break;
            }
        }

        let entries = ledger.transactions.len() as i64;
        if ledger.last_sequence != entries {
            report.issues.push(IntegrityIssue::SequenceCounterMismatch {
                account_id: account.id,
                counter: ledger.last_sequence,
                entries,
            });
        }

        for t in ledger.transactions.iter().filter(|t| t.amount <= 0) {
            report.issues.push(IntegrityIssue::NonPositiveAmount {
                account_id: account.id,
                sequence: t.sequence,
                amount: t.amount,
            });
        }
    }

    report
}
