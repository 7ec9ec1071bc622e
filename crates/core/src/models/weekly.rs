//! Weekly aggregate models for turf-war rankings

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Gross points one user earned at one spot during one week
///
/// Keyed by (spot, user, week start); accumulated with the pre-tax
/// award so rankings are unaffected by tax splits. Never decremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySpotPoints {
    pub spot_id: i64,
    pub user_id: String,
    /// The Sunday (UTC) starting the week
    pub week_start: NaiveDate,
    pub points: i64,
}

/// One leaderboard row for a spot's week
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyScore {
    pub user_id: String,
    pub username: String,
    pub points: i64,
}
