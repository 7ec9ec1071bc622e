//! Transaction log persistence
//!
//! The append-only audit trail behind every wallet mutation. Summing a
//! user's entries must always reproduce the wallet balance.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use turfpoint_core::{Error, Result, Transaction, TransactionKind};

/// Database row for a ledger entry
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    user_id: String,
    amount: i64,
    kind: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            kind: TransactionKind::parse(&row.kind)?,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

/// Append one ledger entry
pub async fn log_transaction(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    kind: TransactionKind,
    description: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO transactions (user_id, amount, kind, description, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(kind.as_str())
    .bind(description)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.last_insert_rowid())
}

/// Get a user's ledger entries, newest first
pub async fn list_transactions(
    pool: &SqlitePool,
    user_id: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<Transaction>> {
    let rows: Vec<TransactionRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, amount, kind, description, created_at
        FROM transactions
        WHERE user_id = ?
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    rows.into_iter().map(Transaction::try_from).collect()
}

/// Signed sum of every entry for a user.
///
/// Reconciliation invariant: this must equal the wallet balance.
pub async fn logged_sum(conn: &mut SqliteConnection, user_id: &str) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.0)
}

/// Lifetime points a user has earned, from the `earn` entries
pub async fn earned_total(conn: &mut SqliteConnection, user_id: &str) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE user_id = ? AND kind = 'earn'",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.0)
}
