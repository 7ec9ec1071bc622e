//! Wallet and transaction-log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earn,
    Spend,
    Initial,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earn => "earn",
            TransactionKind::Spend => "spend",
            TransactionKind::Initial => "initial",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "earn" => Ok(TransactionKind::Earn),
            "spend" => Ok(TransactionKind::Spend),
            "initial" => Ok(TransactionKind::Initial),
            other => Err(Error::InvalidData(format!(
                "unknown transaction kind '{other}'"
            ))),
        }
    }
}

/// Point wallet, exactly one per user
///
/// The balance is only ever touched through atomic conditional writes;
/// a deduction can never drive it negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: String,
    pub balance: i64,
}

/// Immutable ledger entry
///
/// One entry is appended in the same unit of work as every balance
/// mutation, so summing a user's entries always reproduces the balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    /// Signed amount: positive for credits, negative for debits
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_the_db_strings() {
        for kind in [
            TransactionKind::Earn,
            TransactionKind::Spend,
            TransactionKind::Initial,
        ] {
            assert_eq!(TransactionKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(TransactionKind::parse("refund").is_err());
    }
}
