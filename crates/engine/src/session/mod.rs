//! Visit sessions - proximity-gated check-in, check-out, liveness
//!
//! A user holds at most one open visit; checking in anywhere closes
//! whatever was still open first, inside the same transaction.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{info, instrument};
use turfpoint_core::{BadgeCategory, Error, GeoPoint, QuestCondition, Result, Visit};
use turfpoint_persistence::sqlite as db;

use crate::progression;

/// Tuning for visit sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How close a device must be to check in, in meters. Example: 75
    pub max_checkin_distance_m: f64,
    /// Heartbeat silence after which a visitor no longer counts as
    /// present. Example: 30
    pub stale_after_secs: i64,
    /// Flat XP for checking in. Example: 10
    pub checkin_xp: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_checkin_distance_m: 75.0,
            stale_after_secs: 30,
            checkin_xp: 10,
        }
    }
}

/// Opens and closes visits and answers presence queries
pub struct VisitManager {
    pool: SqlitePool,
    config: SessionConfig,
}

impl VisitManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, SessionConfig::default())
    }

    pub fn with_config(pool: SqlitePool, config: SessionConfig) -> Self {
        Self { pool, config }
    }

    /// Open a visit at a spot the device is physically near.
    ///
    /// Closing the previous visit, opening the new one, the check-in
    /// XP, and the progress sync all commit together.
    #[instrument(skip(self))]
    pub async fn check_in(&self, user_id: &str, spot_id: i64, position: GeoPoint) -> Result<Visit> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        // Opening write; also enforces the one-open-visit rule
        let closed = db::close_open_visits(&mut *tx, user_id, now).await?;

        if db::get_user(&mut *tx, user_id).await?.is_none() {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        let spot = db::get_spot(&mut *tx, spot_id)
            .await?
            .ok_or(Error::SpotNotFound(spot_id))?;
        if !spot.is_active {
            return Err(Error::SpotInactive(spot_id));
        }
        if spot.is_depleted() {
            return Err(Error::BudgetDepleted(spot_id));
        }

        let distance_m = position.distance_meters(&spot.location());
        if distance_m > self.config.max_checkin_distance_m {
            return Err(Error::TooFarAway {
                distance_m,
                max_m: self.config.max_checkin_distance_m,
            });
        }

        let visit_id = db::open_visit(&mut *tx, spot_id, user_id, now).await?;
        let level = progression::add_xp(&mut *tx, user_id, self.config.checkin_xp).await?;

        let visit_count = db::count_user_visits(&mut *tx, user_id).await?;
        let mut conditions = vec![QuestCondition::VisitCount];
        if level.leveled_up {
            conditions.push(QuestCondition::LevelReached);
        }
        progression::sync_progress(&mut *tx, user_id, &conditions).await?;
        progression::check_badge_unlock(&mut *tx, user_id, BadgeCategory::Visits, visit_count, now)
            .await?;
        if level.leveled_up {
            progression::check_badge_unlock(
                &mut *tx,
                user_id,
                BadgeCategory::Level,
                level.level,
                now,
            )
            .await?;
        }

        let visit = db::get_visit(&mut *tx, visit_id)
            .await?
            .ok_or(Error::VisitNotFound(visit_id))?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!(
            "{} checked in at spot {} ({:.0}m away, {} stale visit(s) closed)",
            user_id, spot_id, distance_m, closed
        );
        Ok(visit)
    }

    /// Close one of the caller's visits
    #[instrument(skip(self))]
    pub async fn check_out(&self, user_id: &str, visit_id: i64) -> Result<Visit> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let visit = db::get_visit(&mut *tx, visit_id)
            .await?
            .ok_or(Error::VisitNotFound(visit_id))?;
        if visit.user_id != user_id {
            return Err(Error::NotVisitOwner(visit_id));
        }
        if !db::close_visit(&mut *tx, visit_id, now).await? {
            return Err(Error::VisitNotFound(visit_id));
        }

        let visit = db::get_visit(&mut *tx, visit_id)
            .await?
            .ok_or(Error::VisitNotFound(visit_id))?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!(
            "{} checked out of visit {} with {:.3} accrued",
            user_id, visit_id, visit.earned_points
        );
        Ok(visit)
    }

    /// Visitors currently present: open visits whose last heartbeat is
    /// within the staleness window
    pub async fn active_visitors(&self, spot_id: i64) -> Result<i64> {
        let cutoff = Utc::now() - Duration::seconds(self.config.stale_after_secs);
        db::active_visitor_count(&self.pool, spot_id, cutoff).await
    }
}
