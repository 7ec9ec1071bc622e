//! User and leveling models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered player
///
/// Identity is resolved by the (external) auth layer; the core trusts
/// the `user_id` it is handed. `level` is always `level_for_xp(xp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub xp: i64,
    pub level: i64,
    /// Device token for push delivery, if the client registered one
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Level state after an XP award
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub xp: i64,
    pub level: i64,
    /// Whether this particular award crossed a level threshold
    pub leveled_up: bool,
}
