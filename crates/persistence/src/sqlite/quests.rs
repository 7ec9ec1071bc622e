//! Quest definitions and per-user progress
//!
//! Progress writes are guarded so the `in_progress -> completed ->
//! claimed` machine only ever moves forward, and the claim flip is a
//! conditional update that can succeed at most once per (user, quest).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use turfpoint_core::{Error, Quest, QuestCondition, QuestStatus, Result, UserQuest};

/// Database row for a quest definition
#[derive(Debug, sqlx::FromRow)]
struct QuestRow {
    id: i64,
    title: String,
    description: String,
    condition_type: String,
    threshold: i64,
    reward_points: i64,
    is_active: i32,
}

impl TryFrom<QuestRow> for Quest {
    type Error = Error;

    fn try_from(row: QuestRow) -> Result<Self> {
        Ok(Quest {
            id: row.id,
            title: row.title,
            description: row.description,
            condition: QuestCondition::parse(&row.condition_type)?,
            threshold: row.threshold,
            reward_points: row.reward_points,
            is_active: row.is_active != 0,
        })
    }
}

/// Database row for one user's quest progress
#[derive(Debug, sqlx::FromRow)]
struct UserQuestRow {
    user_id: String,
    quest_id: i64,
    progress: i64,
    status: String,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserQuestRow> for UserQuest {
    type Error = Error;

    fn try_from(row: UserQuestRow) -> Result<Self> {
        Ok(UserQuest {
            user_id: row.user_id,
            quest_id: row.quest_id,
            progress: row.progress,
            status: QuestStatus::parse(&row.status)?,
            completed_at: row.completed_at,
        })
    }
}

/// Insert a quest definition
pub async fn create_quest(
    conn: &mut SqliteConnection,
    title: &str,
    description: &str,
    condition: QuestCondition,
    threshold: i64,
    reward_points: i64,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO quests (title, description, condition_type, threshold, reward_points)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(condition.as_str())
    .bind(threshold)
    .bind(reward_points)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.last_insert_rowid())
}

/// Get a quest definition by id
pub async fn get_quest(conn: &mut SqliteConnection, id: i64) -> Result<Option<Quest>> {
    let row: Option<QuestRow> = sqlx::query_as(
        r#"
        SELECT id, title, description, condition_type, threshold, reward_points, is_active
        FROM quests
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    row.map(Quest::try_from).transpose()
}

/// All quest definitions players can currently work on
pub async fn list_active_quests(conn: &mut SqliteConnection) -> Result<Vec<Quest>> {
    let rows: Vec<QuestRow> = sqlx::query_as(
        r#"
        SELECT id, title, description, condition_type, threshold, reward_points, is_active
        FROM quests
        WHERE is_active = 1
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    rows.into_iter().map(Quest::try_from).collect()
}

/// Record freshly recomputed progress for one (user, quest).
///
/// The state machine only moves forward: claimed rows never change,
/// progress never shrinks, and completion is never taken back even if
/// the authoritative count later drops (e.g. a spot changes hands).
pub async fn upsert_quest_progress(
    conn: &mut SqliteConnection,
    user_id: &str,
    quest_id: i64,
    progress: i64,
    status: QuestStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_quests (user_id, quest_id, progress, status)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (user_id, quest_id) DO UPDATE SET
            progress = MAX(user_quests.progress, excluded.progress),
            status = CASE
                WHEN user_quests.status = 'completed' THEN user_quests.status
                ELSE excluded.status
            END
        WHERE user_quests.status != 'claimed'
        "#,
    )
    .bind(user_id)
    .bind(quest_id)
    .bind(progress)
    .bind(status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Flip a completed quest to claimed, stamping the completion time.
///
/// Returns whether this call won the flip; a second claim affects no
/// rows.
pub async fn claim_quest(
    conn: &mut SqliteConnection,
    user_id: &str,
    quest_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE user_quests
        SET status = 'claimed', completed_at = ?
        WHERE user_id = ? AND quest_id = ? AND status = 'completed'
        "#,
    )
    .bind(now)
    .bind(user_id)
    .bind(quest_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}

/// Get one user's progress against one quest
pub async fn get_user_quest(
    conn: &mut SqliteConnection,
    user_id: &str,
    quest_id: i64,
) -> Result<Option<UserQuest>> {
    let row: Option<UserQuestRow> = sqlx::query_as(
        r#"
        SELECT user_id, quest_id, progress, status, completed_at
        FROM user_quests
        WHERE user_id = ? AND quest_id = ?
        "#,
    )
    .bind(user_id)
    .bind(quest_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    row.map(UserQuest::try_from).transpose()
}

/// All progress rows for a user
pub async fn list_user_quests(pool: &SqlitePool, user_id: &str) -> Result<Vec<UserQuest>> {
    let rows: Vec<UserQuestRow> = sqlx::query_as(
        r#"
        SELECT user_id, quest_id, progress, status, completed_at
        FROM user_quests
        WHERE user_id = ?
        ORDER BY quest_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    rows.into_iter().map(UserQuest::try_from).collect()
}
