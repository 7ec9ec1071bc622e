//! Visit persistence - open sessions, liveness, accrual bookkeeping

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use turfpoint_core::{Error, Result, Visit};

/// Database row for visit
#[derive(Debug, sqlx::FromRow)]
struct VisitRow {
    id: i64,
    spot_id: i64,
    user_id: String,
    checked_in_at: DateTime<Utc>,
    checked_out_at: Option<DateTime<Utc>>,
    earned_points: f64,
    last_heartbeat_at: DateTime<Utc>,
}

impl From<VisitRow> for Visit {
    fn from(row: VisitRow) -> Self {
        Visit {
            id: row.id,
            spot_id: row.spot_id,
            user_id: row.user_id,
            checked_in_at: row.checked_in_at,
            checked_out_at: row.checked_out_at,
            earned_points: row.earned_points,
            last_heartbeat_at: row.last_heartbeat_at,
        }
    }
}

/// Open a fresh visit; any prior open visit must be closed first
pub async fn open_visit(
    conn: &mut SqliteConnection,
    spot_id: i64,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO visits (spot_id, user_id, checked_in_at, earned_points, last_heartbeat_at)
        VALUES (?, ?, ?, 0.0, ?)
        "#,
    )
    .bind(spot_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.last_insert_rowid())
}

/// Get a visit by id
pub async fn get_visit(conn: &mut SqliteConnection, id: i64) -> Result<Option<Visit>> {
    let row: Option<VisitRow> = sqlx::query_as(
        r#"
        SELECT id, spot_id, user_id, checked_in_at, checked_out_at,
               earned_points, last_heartbeat_at
        FROM visits
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(Visit::from))
}

/// Get a user's open visit, if any
pub async fn get_open_visit(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<Visit>> {
    let row: Option<VisitRow> = sqlx::query_as(
        r#"
        SELECT id, spot_id, user_id, checked_in_at, checked_out_at,
               earned_points, last_heartbeat_at
        FROM visits
        WHERE user_id = ? AND checked_out_at IS NULL
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(Visit::from))
}

/// Stamp the check-out time; returns false if the visit was not open
pub async fn close_visit(
    conn: &mut SqliteConnection,
    visit_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE visits SET checked_out_at = ? WHERE id = ? AND checked_out_at IS NULL",
    )
    .bind(now)
    .bind(visit_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}

/// Close everything a user still has open; check-in runs this first
pub async fn close_open_visits(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE visits SET checked_out_at = ? WHERE user_id = ? AND checked_out_at IS NULL",
    )
    .bind(now)
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected())
}

/// Record liveness for an open visit; returns false when the visit is
/// missing or already closed
pub async fn touch_visit(
    conn: &mut SqliteConnection,
    visit_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE visits SET last_heartbeat_at = ? WHERE id = ? AND checked_out_at IS NULL",
    )
    .bind(now)
    .bind(visit_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}

/// Persist the advanced fractional accumulator
pub async fn set_visit_earned(
    conn: &mut SqliteConnection,
    visit_id: i64,
    earned: f64,
) -> Result<()> {
    sqlx::query("UPDATE visits SET earned_points = ? WHERE id = ?")
        .bind(earned)
        .bind(visit_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Total visits a user ever checked in, open or closed
pub async fn count_user_visits(conn: &mut SqliteConnection, user_id: &str) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(count.0)
}

/// Open visits at a spot with a heartbeat after the cutoff
pub async fn active_visitor_count(
    pool: &SqlitePool,
    spot_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<i64> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM visits
        WHERE spot_id = ? AND checked_out_at IS NULL AND last_heartbeat_at > ?
        "#,
    )
    .bind(spot_id)
    .bind(cutoff)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(count.0)
}
