//! Spot persistence and budget bookkeeping
//!
//! The budget tracker lives here: unconditional drains, the terminal
//! deactivation flip, and the guarded ownership transfer. Everything
//! takes a connection so callers can compose these inside their own
//! transaction.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use turfpoint_core::{Error, NewSpot, Result, Spot};

/// Database row for spot
#[derive(Debug, sqlx::FromRow)]
struct SpotRow {
    id: i64,
    name: String,
    latitude: f64,
    longitude: f64,
    creator_id: Option<String>,
    owner_id: Option<String>,
    total_points: f64,
    remaining_points: f64,
    rate_per_minute: f64,
    tax_rate: f64,
    activity: i64,
    level: i64,
    shield_until: Option<DateTime<Utc>>,
    boost_until: Option<DateTime<Utc>>,
    boost_tax_rate: Option<f64>,
    is_active: i32,
    created_at: DateTime<Utc>,
}

impl From<SpotRow> for Spot {
    fn from(row: SpotRow) -> Self {
        Spot {
            id: row.id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            creator_id: row.creator_id,
            owner_id: row.owner_id,
            total_points: row.total_points,
            remaining_points: row.remaining_points,
            rate_per_minute: row.rate_per_minute,
            tax_rate: row.tax_rate,
            activity: row.activity,
            level: row.level,
            shield_until: row.shield_until,
            boost_until: row.boost_until,
            boost_tax_rate: row.boost_tax_rate,
            is_active: row.is_active != 0,
            created_at: row.created_at,
        }
    }
}

const SPOT_COLUMNS: &str = r#"
    id, name, latitude, longitude, creator_id, owner_id,
    total_points, remaining_points, rate_per_minute, tax_rate,
    activity, level, shield_until, boost_until, boost_tax_rate,
    is_active, created_at
"#;

/// Insert a new spot with a full budget
pub async fn create_spot(
    conn: &mut SqliteConnection,
    spot: &NewSpot,
    creator_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO spots
            (name, latitude, longitude, creator_id, total_points,
             remaining_points, rate_per_minute, tax_rate, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&spot.name)
    .bind(spot.latitude)
    .bind(spot.longitude)
    .bind(creator_id)
    .bind(spot.budget)
    .bind(spot.budget)
    .bind(spot.rate_per_minute)
    .bind(spot.tax_rate)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.last_insert_rowid())
}

/// Get a spot by id
pub async fn get_spot(conn: &mut SqliteConnection, id: i64) -> Result<Option<Spot>> {
    let row: Option<SpotRow> =
        sqlx::query_as(&format!("SELECT {SPOT_COLUMNS} FROM spots WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(Spot::from))
}

/// List every active spot
pub async fn list_active_spots(pool: &SqlitePool) -> Result<Vec<Spot>> {
    let rows: Vec<SpotRow> = sqlx::query_as(&format!(
        "SELECT {SPOT_COLUMNS} FROM spots WHERE is_active = 1 ORDER BY id"
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(rows.into_iter().map(Spot::from).collect())
}

/// Drain the remaining budget unconditionally.
///
/// The balance may land at or below zero by one tick's fraction; the
/// next heartbeat's precondition check turns that into depletion.
pub async fn drain_budget(conn: &mut SqliteConnection, spot_id: i64, amount: f64) -> Result<()> {
    sqlx::query("UPDATE spots SET remaining_points = remaining_points - ? WHERE id = ?")
        .bind(amount)
        .bind(spot_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Flip a spot inactive; idempotent, and terminal until an operator
/// intervenes
pub async fn deactivate_spot(conn: &mut SqliteConnection, spot_id: i64) -> Result<()> {
    sqlx::query("UPDATE spots SET is_active = 0 WHERE id = ?")
        .bind(spot_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Persist the activity counter and spot level after a settled tick
pub async fn record_activity(
    conn: &mut SqliteConnection,
    spot_id: i64,
    activity: i64,
    level: i64,
) -> Result<()> {
    sqlx::query("UPDATE spots SET activity = ?, level = ? WHERE id = ?")
        .bind(activity)
        .bind(level)
        .bind(spot_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Open a capture-immunity window
pub async fn set_shield(
    conn: &mut SqliteConnection,
    spot_id: i64,
    until: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE spots SET shield_until = ? WHERE id = ?")
        .bind(until)
        .bind(spot_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Open a boosted-tax window at the given percent rate
pub async fn set_boost(
    conn: &mut SqliteConnection,
    spot_id: i64,
    until: DateTime<Utc>,
    boosted_rate: f64,
) -> Result<()> {
    sqlx::query("UPDATE spots SET boost_until = ?, boost_tax_rate = ? WHERE id = ?")
        .bind(until)
        .bind(boosted_rate)
        .bind(spot_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Hand the spot to a new owner, clearing shield and boost.
///
/// Guarded on the owner the caller saw, so a takeover that lost a race
/// changes nothing; returns whether the transfer happened.
pub async fn transfer_owner(
    conn: &mut SqliteConnection,
    spot_id: i64,
    expected_owner: Option<&str>,
    new_owner: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE spots
        SET owner_id = ?, shield_until = NULL, boost_until = NULL, boost_tax_rate = NULL
        WHERE id = ? AND owner_id IS ?
        "#,
    )
    .bind(new_owner)
    .bind(spot_id)
    .bind(expected_owner)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}

/// Spots a user currently holds, counting creator fallback ownership
pub async fn count_owned(conn: &mut SqliteConnection, user_id: &str) -> Result<i64> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM spots
        WHERE owner_id = ? OR (owner_id IS NULL AND creator_id = ?)
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(count.0)
}
