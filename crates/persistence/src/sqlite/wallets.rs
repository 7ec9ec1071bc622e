//! Wallet balance operations
//!
//! Balances move only through the conditional updates here; the caller
//! pairs every successful move with a ledger append in the same
//! transaction so the log stays reconcilable with the balance.

use sqlx::SqliteConnection;
use turfpoint_core::{Error, Result};

/// Create a wallet with an opening balance
pub async fn create_wallet(
    conn: &mut SqliteConnection,
    user_id: &str,
    balance: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO wallets (user_id, balance) VALUES (?, ?)")
        .bind(user_id)
        .bind(balance)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Get a user's current balance
pub async fn get_balance(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM wallets WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|r| r.0))
}

/// Add points to a wallet
pub async fn credit_wallet(conn: &mut SqliteConnection, user_id: &str, amount: i64) -> Result<()> {
    let result = sqlx::query("UPDATE wallets SET balance = balance + ? WHERE user_id = ?")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(Error::UserNotFound(user_id.to_string()));
    }

    Ok(())
}

/// Deduct points only if the balance covers the amount.
///
/// A single conditional update, so two racing debits can never drive
/// the balance negative; returns whether the deduction happened.
pub async fn debit_if_possible(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET balance = balance - ?
        WHERE user_id = ? AND balance >= ?
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .bind(amount)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}
