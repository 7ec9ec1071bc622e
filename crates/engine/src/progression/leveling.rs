//! XP curve and level bookkeeping

use sqlx::SqliteConnection;
use turfpoint_core::{Error, LevelInfo, Result};
use turfpoint_persistence::sqlite as db;

/// Level for a cumulative XP total.
///
/// Level n starts at 100 * (n - 1)^2 XP, so thresholds land at
/// 0, 100, 400, 900, 1600, ...
pub fn level_for_xp(xp: i64) -> i64 {
    let mut level = 1;
    while xp >= 100 * level * level {
        level += 1;
    }
    level
}

/// Grant XP and persist the recomputed level
pub async fn add_xp(conn: &mut SqliteConnection, user_id: &str, amount: i64) -> Result<LevelInfo> {
    let user = db::get_user(&mut *conn, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;

    let xp = user.xp + amount;
    let level = level_for_xp(xp);
    db::update_xp(&mut *conn, user_id, xp, level).await?;

    Ok(LevelInfo {
        xp,
        level,
        leveled_up: level > user.level,
    })
}
