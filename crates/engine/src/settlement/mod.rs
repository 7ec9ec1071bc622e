//! Heartbeat settlement - fractional accrual, discrete awards, owner tax
//!
//! Each open visit accrues a fractional accumulator (`earned_points`)
//! that only pays out whole points: a tick awards `floor(new) -
//! floor(old)`, so summing the awards over any run of ticks equals
//! `floor(final accumulator)` with no drift. The spot budget drains by
//! the raw fraction every tick and depletion is checked *before* a
//! tick settles, so the budget may rest below zero by at most one
//! increment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};
use turfpoint_core::{
    week_start, BadgeCategory, Error, LevelInfo, QuestCondition, Result, TransactionKind,
    WeeklyScore,
};
use turfpoint_persistence::sqlite as db;

use crate::progression;

/// Tuning for the accrual loop
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Ticks per minute the client sends while checked in. Example: 12
    pub heartbeats_per_minute: u32,
    /// Activity units per spot level. A spot at level n advances once
    /// its counter reaches n * this. Example: 500
    pub activity_per_level: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            heartbeats_per_minute: 12,
            activity_per_level: 500,
        }
    }
}

/// What one settled heartbeat did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatOutcome {
    pub visit_id: i64,
    /// Whole points crossed this tick, before tax
    pub points_awarded: i64,
    /// Portion of the award routed to the spot owner
    pub tax_paid: i64,
    pub xp_awarded: i64,
    /// Fractional accumulator after the tick
    pub earned_points: f64,
    pub level: LevelInfo,
}

/// Settles heartbeat ticks for open visits
pub struct SettlementEngine {
    pool: SqlitePool,
    config: SettlementConfig,
}

impl SettlementEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, SettlementConfig::default())
    }

    pub fn with_config(pool: SqlitePool, config: SettlementConfig) -> Self {
        Self { pool, config }
    }

    /// Settle one tick of an open visit.
    ///
    /// Everything a tick does commits as one transaction. The only
    /// path that commits *and* fails is depletion: the deactivation
    /// must stick even though the tick awards nothing.
    ///
    /// Ticks carry no idempotency key; a client that retries a
    /// delivered heartbeat accrues twice.
    #[instrument(skip(self))]
    pub async fn heartbeat(&self, visit_id: i64) -> Result<HeartbeatOutcome> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        // Liveness stamp doubles as the open-visit check, and being a
        // write it takes the database lock for the whole settlement
        if !db::touch_visit(&mut *tx, visit_id, now).await? {
            return Err(Error::VisitNotFound(visit_id));
        }

        let visit = db::get_visit(&mut *tx, visit_id)
            .await?
            .ok_or(Error::VisitNotFound(visit_id))?;
        let spot = db::get_spot(&mut *tx, visit.spot_id)
            .await?
            .ok_or(Error::SpotNotFound(visit.spot_id))?;

        if !spot.is_active {
            return Err(Error::SpotInactive(spot.id));
        }
        if spot.is_depleted() {
            // Depletion is a persisted outcome: the flip commits even
            // though the tick itself fails
            db::deactivate_spot(&mut *tx, spot.id).await?;
            tx.commit()
                .await
                .map_err(|e| Error::DatabaseError(e.to_string()))?;
            warn!("Spot {} ('{}') hit zero budget; deactivated", spot.id, spot.name);
            return Err(Error::BudgetDepleted(spot.id));
        }

        let increment = spot.rate_per_minute / f64::from(self.config.heartbeats_per_minute);
        let xp_increment = increment / 2.0;

        let old_earned = visit.earned_points;
        let new_earned = old_earned + increment;
        db::set_visit_earned(&mut *tx, visit_id, new_earned).await?;
        db::drain_budget(&mut *tx, spot.id, increment).await?;

        // Whole points crossed this tick
        let award = (new_earned.floor() - old_earned.floor()) as i64;
        let mut tax = 0;
        if award > 0 {
            if let Some(owner) = spot.resolved_owner().filter(|o| *o != visit.user_id) {
                let r = spot.effective_tax_fraction(now);
                tax = ((new_earned * r).floor() - (old_earned * r).floor()) as i64;
                if tax > 0 {
                    db::credit_wallet(&mut *tx, owner, tax).await?;
                    db::log_transaction(
                        &mut *tx,
                        owner,
                        tax,
                        TransactionKind::Earn,
                        &format!("Owner tax from spot '{}'", spot.name),
                        now,
                    )
                    .await?;
                }
            }

            let gain = award - tax;
            if gain > 0 {
                db::credit_wallet(&mut *tx, &visit.user_id, gain).await?;
                db::log_transaction(
                    &mut *tx,
                    &visit.user_id,
                    gain,
                    TransactionKind::Earn,
                    &format!("Earned at spot '{}'", spot.name),
                    now,
                )
                .await?;
            }

            // Turf-war standings count the gross award
            db::add_weekly_points(&mut *tx, spot.id, &visit.user_id, week_start(now), award)
                .await?;
        }
        let user_gain = award - tax;

        // One activity unit per settled tick drives the spot level
        let activity = spot.activity + 1;
        let mut spot_level = spot.level;
        if activity >= spot_level * self.config.activity_per_level {
            spot_level += 1;
        }
        db::record_activity(&mut *tx, spot.id, activity, spot_level).await?;

        // Showing up is worth at least one XP even at slow rates
        let xp_award = xp_increment.max(1.0).floor() as i64;
        let level = progression::add_xp(&mut *tx, &visit.user_id, xp_award).await?;

        let mut conditions = Vec::new();
        if user_gain > 0 {
            conditions.push(QuestCondition::PointsEarned);
        }
        if level.leveled_up {
            conditions.push(QuestCondition::LevelReached);
        }
        if !conditions.is_empty() {
            progression::sync_progress(&mut *tx, &visit.user_id, &conditions).await?;
        }
        if level.leveled_up {
            progression::check_badge_unlock(
                &mut *tx,
                &visit.user_id,
                BadgeCategory::Level,
                level.level,
                now,
            )
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!(
            "Visit {} settled: +{} points ({} taxed), +{} xp, accumulator {:.3}",
            visit_id, user_gain, tax, xp_award, new_earned
        );

        Ok(HeartbeatOutcome {
            visit_id,
            points_awarded: award,
            tax_paid: tax,
            xp_awarded: xp_award,
            earned_points: new_earned,
            level,
        })
    }

    /// Turf-war standings for the week containing `at`, highest gross
    /// earners first. Ranks the gross buckets the heartbeats fold into,
    /// so tax splits never move a visitor down the table.
    pub async fn weekly_standings(
        &self,
        spot_id: i64,
        at: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WeeklyScore>> {
        db::spot_leaderboard(&self.pool, spot_id, week_start(at), limit).await
    }
}
