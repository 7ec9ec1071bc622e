//! Visit models - an open visit accrues fractional points per heartbeat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's stay at a spot
///
/// A user has at most one open visit at a time; checking in anywhere
/// closes any visit still open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: i64,
    pub spot_id: i64,
    pub user_id: String,
    pub checked_in_at: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
    /// Cumulative fractional points; only ever grows while the visit is
    /// open. Whole points are paid out as integer floors are crossed.
    pub earned_points: f64,
    /// Liveness signal; visitors with a recent heartbeat count as present
    pub last_heartbeat_at: DateTime<Utc>,
}

impl Visit {
    pub fn is_open(&self) -> bool {
        self.checked_out_at.is_none()
    }

    /// Whole points banked so far over the lifetime of this visit.
    pub fn banked_points(&self) -> i64 {
        self.earned_points.floor() as i64
    }
}
