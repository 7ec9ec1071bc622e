//! Badge definitions and unlocks

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use turfpoint_core::{Badge, BadgeCategory, Error, Result, UserBadge};

/// Database row for a badge definition
#[derive(Debug, sqlx::FromRow)]
struct BadgeRow {
    id: i64,
    category: String,
    threshold: i64,
    title: String,
}

impl TryFrom<BadgeRow> for Badge {
    type Error = Error;

    fn try_from(row: BadgeRow) -> Result<Self> {
        Ok(Badge {
            id: row.id,
            category: BadgeCategory::parse(&row.category)?,
            threshold: row.threshold,
            title: row.title,
        })
    }
}

/// Insert a badge definition
pub async fn create_badge(
    conn: &mut SqliteConnection,
    category: BadgeCategory,
    threshold: i64,
    title: &str,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO badges (category, threshold, title) VALUES (?, ?, ?)")
        .bind(category.as_str())
        .bind(threshold)
        .bind(title)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.last_insert_rowid())
}

/// Badge definitions for one counter category, lowest threshold first
pub async fn badges_in_category(
    conn: &mut SqliteConnection,
    category: BadgeCategory,
) -> Result<Vec<Badge>> {
    let rows: Vec<BadgeRow> = sqlx::query_as(
        r#"
        SELECT id, category, threshold, title
        FROM badges
        WHERE category = ?
        ORDER BY threshold
        "#,
    )
    .bind(category.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    rows.into_iter().map(Badge::try_from).collect()
}

/// Unlock a badge for a user; returns false when already held
pub async fn unlock_badge(
    conn: &mut SqliteConnection,
    user_id: &str,
    badge_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO user_badges (user_id, badge_id, unlocked_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(badge_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}

/// Every badge a user holds
pub async fn list_user_badges(pool: &SqlitePool, user_id: &str) -> Result<Vec<UserBadge>> {
    let rows: Vec<(String, i64, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT user_id, badge_id, unlocked_at
        FROM user_badges
        WHERE user_id = ?
        ORDER BY unlocked_at
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(user_id, badge_id, unlocked_at)| UserBadge {
            user_id,
            badge_id,
            unlocked_at,
        })
        .collect())
}
