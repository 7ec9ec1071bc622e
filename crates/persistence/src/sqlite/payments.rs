//! Payment intent consumption records
//!
//! The intent id is the primary key, so an intent can credit points at
//! most once no matter how many times the client retries the purchase.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use turfpoint_core::{Error, Result};

/// Mark an intent consumed; returns false when it already was
pub async fn consume_intent(
    conn: &mut SqliteConnection,
    intent_id: &str,
    user_id: &str,
    points: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO payments (intent_id, user_id, points, consumed_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(intent_id)
    .bind(user_id)
    .bind(points)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}
