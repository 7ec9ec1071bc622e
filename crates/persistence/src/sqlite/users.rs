//! User CRUD operations

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use turfpoint_core::{Error, Result, User};

/// Database row for user
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: String,
    username: String,
    xp: i64,
    level: i64,
    push_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            username: row.username,
            xp: row.xp,
            level: row.level,
            push_token: row.push_token,
            created_at: row.created_at,
        }
    }
}

/// Create a new user at level 1 with no XP
pub async fn create_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    username: &str,
    push_token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (user_id, username, xp, level, push_token, created_at)
        VALUES (?, ?, 0, 1, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(username)
    .bind(push_token)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Get a user by id
pub async fn get_user(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(
        r#"
        SELECT user_id, username, xp, level, push_token, created_at
        FROM users
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(User::from))
}

/// Check if a username is already taken
pub async fn username_taken(conn: &mut SqliteConnection, username: &str) -> Result<bool> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(count.0 > 0)
}

/// Persist a user's XP and level after an award
pub async fn update_xp(
    conn: &mut SqliteConnection,
    user_id: &str,
    xp: i64,
    level: i64,
) -> Result<()> {
    sqlx::query("UPDATE users SET xp = ?, level = ? WHERE user_id = ?")
        .bind(xp)
        .bind(level)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Update the push token registered for a user's device
pub async fn set_push_token(
    conn: &mut SqliteConnection,
    user_id: &str,
    token: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE users SET push_token = ? WHERE user_id = ?")
        .bind(token)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}
