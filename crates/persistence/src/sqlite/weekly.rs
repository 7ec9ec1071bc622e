//! Weekly turf-war aggregates

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use turfpoint_core::{Error, Result, WeeklyScore};

/// Fold a gross award into the (spot, user, week) bucket
pub async fn add_weekly_points(
    conn: &mut SqliteConnection,
    spot_id: i64,
    user_id: &str,
    week_start: NaiveDate,
    points: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO weekly_spot_points (spot_id, user_id, week_start, points)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (spot_id, user_id, week_start)
        DO UPDATE SET points = points + excluded.points
        "#,
    )
    .bind(spot_id)
    .bind(user_id)
    .bind(week_start)
    .bind(points)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Points one user earned at one spot during one week
pub async fn user_week_points(
    conn: &mut SqliteConnection,
    spot_id: i64,
    user_id: &str,
    week_start: NaiveDate,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(points), 0) FROM weekly_spot_points
        WHERE spot_id = ? AND user_id = ? AND week_start = ?
        "#,
    )
    .bind(spot_id)
    .bind(user_id)
    .bind(week_start)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.0)
}

/// Ranking for a spot's week, highest earners first
pub async fn spot_leaderboard(
    pool: &SqlitePool,
    spot_id: i64,
    week_start: NaiveDate,
    limit: u32,
) -> Result<Vec<WeeklyScore>> {
    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        r#"
        SELECT w.user_id, u.username, w.points
        FROM weekly_spot_points w
        JOIN users u ON u.user_id = w.user_id
        WHERE w.spot_id = ? AND w.week_start = ?
        ORDER BY w.points DESC, u.username
        LIMIT ?
        "#,
    )
    .bind(spot_id)
    .bind(week_start)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(user_id, username, points)| WeeklyScore {
            user_id,
            username,
            points,
        })
        .collect())
}
