//! Spot ownership - creation, takeovers, shield and boost purchases
//!
//! Ownership changes money and state together, so every operation here
//! is one transaction built around a conditional update: the wallet
//! debit (`balance >= cost`) and the owner transfer (`owner_id IS` the
//! one the challenger saw) each either fully happen or leave nothing
//! behind.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};
use turfpoint_core::{BadgeCategory, Error, NewSpot, QuestCondition, Result, Spot, TransactionKind};
use turfpoint_persistence::sqlite as db;

use crate::external::PushSender;
use crate::progression;

/// Pricing and tuning for ownership moves
#[derive(Debug, Clone)]
pub struct OwnershipConfig {
    /// Flat surcharge on top of the remaining budget when capturing a
    /// spot. Example: 100
    pub takeover_premium: i64,
    /// Share of the premium the ousted owner receives. Example: 0.5
    pub payout_fraction: f64,
    /// Price of a capture-immunity window. Example: 150
    pub shield_cost: i64,
    /// Shield duration in minutes. Example: 60
    pub shield_duration_mins: i64,
    /// Price of a boosted-tax window. Example: 100
    pub boost_cost: i64,
    /// Boost duration in minutes. Example: 60
    pub boost_duration_mins: i64,
    /// Tax percent while a boost is open. Example: 15
    pub boost_tax_rate: f64,
    /// Upper bound on the tax rate a creator may pick. Example: 25
    pub max_tax_rate: f64,
    /// Flat XP for creating a spot. Example: 25
    pub creation_xp: i64,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            takeover_premium: 100,
            payout_fraction: 0.5,
            shield_cost: 150,
            shield_duration_mins: 60,
            boost_cost: 100,
            boost_duration_mins: 60,
            boost_tax_rate: 15.0,
            max_tax_rate: 25.0,
            creation_xp: 25,
        }
    }
}

/// Creates spots and moves them between owners
pub struct OwnershipManager {
    pool: SqlitePool,
    config: OwnershipConfig,
    push: Arc<dyn PushSender>,
}

impl OwnershipManager {
    pub fn new(pool: SqlitePool, push: Arc<dyn PushSender>) -> Self {
        Self::with_config(pool, push, OwnershipConfig::default())
    }

    pub fn with_config(
        pool: SqlitePool,
        push: Arc<dyn PushSender>,
        config: OwnershipConfig,
    ) -> Self {
        Self { pool, config, push }
    }

    /// Create a spot funded from the creator's wallet.
    ///
    /// The debit, the spot row, and the creation XP commit together;
    /// the creator owns the spot by fallback until someone captures it.
    #[instrument(skip(self, new_spot), fields(name = %new_spot.name))]
    pub async fn create_spot(&self, creator_id: &str, new_spot: &NewSpot) -> Result<Spot> {
        if new_spot.name.trim().is_empty() {
            return Err(Error::InvalidData("spot name must not be empty".into()));
        }
        if !(new_spot.budget > 0.0) {
            return Err(Error::InvalidData("spot budget must be positive".into()));
        }
        if !(new_spot.rate_per_minute > 0.0) {
            return Err(Error::InvalidData("rate per minute must be positive".into()));
        }
        if !(new_spot.tax_rate >= 0.0 && new_spot.tax_rate <= self.config.max_tax_rate) {
            return Err(Error::InvalidData(format!(
                "tax rate must be between 0 and {}",
                self.config.max_tax_rate
            )));
        }

        let now = Utc::now();
        let cost = new_spot.budget.ceil() as i64;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        if !db::debit_if_possible(&mut *tx, creator_id, cost).await? {
            let available = db::get_balance(&mut *tx, creator_id)
                .await?
                .ok_or_else(|| Error::UserNotFound(creator_id.to_string()))?;
            return Err(Error::InsufficientFunds {
                required: cost,
                available,
            });
        }
        db::log_transaction(
            &mut *tx,
            creator_id,
            -cost,
            TransactionKind::Spend,
            &format!("Created spot '{}'", new_spot.name),
            now,
        )
        .await?;

        let spot_id = db::create_spot(&mut *tx, new_spot, Some(creator_id), now).await?;
        let level = progression::add_xp(&mut *tx, creator_id, self.config.creation_xp).await?;

        let mut conditions = vec![QuestCondition::SpotsOwned];
        if level.leveled_up {
            conditions.push(QuestCondition::LevelReached);
        }
        progression::sync_progress(&mut *tx, creator_id, &conditions).await?;

        let owned = db::count_owned(&mut *tx, creator_id).await?;
        progression::check_badge_unlock(&mut *tx, creator_id, BadgeCategory::SpotsOwned, owned, now)
            .await?;

        let spot = db::get_spot(&mut *tx, spot_id)
            .await?
            .ok_or(Error::SpotNotFound(spot_id))?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!(
            "{} created spot {} ('{}') for {} points",
            creator_id, spot_id, spot.name, cost
        );
        Ok(spot)
    }

    /// Capture a spot from its current owner.
    ///
    /// Costs the remaining budget (rounded up, never negative) plus the
    /// premium; the ousted owner gets a slice of the premium and loses
    /// any shield or boost still open. The transfer is guarded on the
    /// owner the challenger saw, so racing takeovers cannot both win.
    #[instrument(skip(self))]
    pub async fn take_over(&self, challenger_id: &str, spot_id: i64) -> Result<Spot> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let spot = db::get_spot(&mut *tx, spot_id)
            .await?
            .ok_or(Error::SpotNotFound(spot_id))?;

        if let Some(until) = spot.shield_until.filter(|u| *u > now) {
            return Err(Error::ShieldActive { spot_id, until });
        }
        let previous = spot.resolved_owner().map(str::to_string);
        if previous.as_deref() == Some(challenger_id) {
            return Err(Error::AlreadyOwner(spot_id));
        }

        let cost = spot.remaining_points.max(0.0).ceil() as i64 + self.config.takeover_premium;
        if !db::debit_if_possible(&mut *tx, challenger_id, cost).await? {
            let available = db::get_balance(&mut *tx, challenger_id)
                .await?
                .ok_or_else(|| Error::UserNotFound(challenger_id.to_string()))?;
            return Err(Error::InsufficientFunds {
                required: cost,
                available,
            });
        }
        db::log_transaction(
            &mut *tx,
            challenger_id,
            -cost,
            TransactionKind::Spend,
            &format!("Takeover of spot '{}'", spot.name),
            now,
        )
        .await?;

        let payout = (self.config.takeover_premium as f64 * self.config.payout_fraction).floor()
            as i64;
        let mut push_token = None;
        if let Some(prev) = previous.as_deref() {
            if payout > 0 {
                db::credit_wallet(&mut *tx, prev, payout).await?;
                db::log_transaction(
                    &mut *tx,
                    prev,
                    payout,
                    TransactionKind::Earn,
                    &format!("Takeover payout for spot '{}'", spot.name),
                    now,
                )
                .await?;
            }
            push_token = db::get_user(&mut *tx, prev).await?.and_then(|u| u.push_token);
        }

        if !db::transfer_owner(&mut *tx, spot_id, spot.owner_id.as_deref(), challenger_id).await? {
            return Err(Error::OwnershipChanged(spot_id));
        }

        progression::sync_progress(&mut *tx, challenger_id, &[QuestCondition::SpotsOwned]).await?;
        let owned = db::count_owned(&mut *tx, challenger_id).await?;
        progression::check_badge_unlock(
            &mut *tx,
            challenger_id,
            BadgeCategory::SpotsOwned,
            owned,
            now,
        )
        .await?;

        let updated = db::get_spot(&mut *tx, spot_id)
            .await?
            .ok_or(Error::SpotNotFound(spot_id))?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!(
            "{} took over spot {} ('{}') for {} points",
            challenger_id, spot_id, updated.name, cost
        );

        if let Some(token) = push_token {
            let push = Arc::clone(&self.push);
            let challenger = challenger_id.to_string();
            let spot_name = updated.name.clone();
            tokio::spawn(async move {
                let payload = serde_json::json!({
                    "type": "takeover",
                    "spotId": spot_id,
                    "newOwner": challenger,
                });
                let body = format!("{challenger} captured '{spot_name}'");
                if let Err(e) = push.send(&token, "Spot lost!", &body, payload).await {
                    warn!("Takeover push for spot {spot_id} failed: {e}");
                }
            });
        }

        Ok(updated)
    }

    /// Buy a capture-immunity window for an owned spot
    #[instrument(skip(self))]
    pub async fn activate_shield(&self, owner_id: &str, spot_id: i64) -> Result<Spot> {
        self.buy_modifier(owner_id, spot_id, Modifier::Shield).await
    }

    /// Buy a boosted-tax window for an owned spot
    #[instrument(skip(self))]
    pub async fn activate_boost(&self, owner_id: &str, spot_id: i64) -> Result<Spot> {
        self.buy_modifier(owner_id, spot_id, Modifier::Boost).await
    }

    async fn buy_modifier(
        &self,
        owner_id: &str,
        spot_id: i64,
        modifier: Modifier,
    ) -> Result<Spot> {
        let now = Utc::now();
        let (cost, label) = match modifier {
            Modifier::Shield => (self.config.shield_cost, "Shield"),
            Modifier::Boost => (self.config.boost_cost, "Tax boost"),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let spot = db::get_spot(&mut *tx, spot_id)
            .await?
            .ok_or(Error::SpotNotFound(spot_id))?;
        if spot.resolved_owner() != Some(owner_id) {
            return Err(Error::NotSpotOwner(spot_id));
        }

        if !db::debit_if_possible(&mut *tx, owner_id, cost).await? {
            let available = db::get_balance(&mut *tx, owner_id)
                .await?
                .ok_or_else(|| Error::UserNotFound(owner_id.to_string()))?;
            return Err(Error::InsufficientFunds {
                required: cost,
                available,
            });
        }
        db::log_transaction(
            &mut *tx,
            owner_id,
            -cost,
            TransactionKind::Spend,
            &format!("{} for spot '{}'", label, spot.name),
            now,
        )
        .await?;

        match modifier {
            Modifier::Shield => {
                let until = now + Duration::minutes(self.config.shield_duration_mins);
                db::set_shield(&mut *tx, spot_id, until).await?;
            }
            Modifier::Boost => {
                let until = now + Duration::minutes(self.config.boost_duration_mins);
                db::set_boost(&mut *tx, spot_id, until, self.config.boost_tax_rate).await?;
            }
        }

        let updated = db::get_spot(&mut *tx, spot_id)
            .await?
            .ok_or(Error::SpotNotFound(spot_id))?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!("{} bought a {} on spot {}", owner_id, label.to_lowercase(), spot_id);
        Ok(updated)
    }
}

#[derive(Debug, Clone, Copy)]
enum Modifier {
    Shield,
    Boost,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::NoopPushSender;
    use crate::test_support::{seed_user, test_pool};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use turfpoint_core::ErrorKind;

    fn manager(pool: &SqlitePool) -> OwnershipManager {
        OwnershipManager::new(pool.clone(), Arc::new(NoopPushSender))
    }

    fn new_spot(budget: f64) -> NewSpot {
        NewSpot {
            name: "Fountain".into(),
            latitude: 52.52,
            longitude: 13.405,
            budget,
            rate_per_minute: 12.0,
            tax_rate: 10.0,
        }
    }

    async fn balance(pool: &SqlitePool, user_id: &str) -> i64 {
        let mut conn = pool.acquire().await.unwrap();
        db::get_balance(&mut conn, user_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn creating_a_spot_funds_it_from_the_wallet() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;

        let spot = manager(&pool)
            .create_spot("mara", &new_spot(120.5))
            .await
            .unwrap();

        // fractional budgets round the price up
        assert_eq!(balance(&pool, "mara").await, 379);
        assert_eq!(spot.remaining_points, 120.5);
        assert_eq!(spot.creator_id.as_deref(), Some("mara"));
        assert_eq!(spot.owner_id, None);
        assert_eq!(spot.resolved_owner(), Some("mara"));

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(db::logged_sum(&mut conn, "mara").await.unwrap(), 379);
        let user = db::get_user(&mut conn, "mara").await.unwrap().unwrap();
        assert_eq!(user.xp, 25);
    }

    #[tokio::test]
    async fn creation_rejects_bad_parameters() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;
        let spots = manager(&pool);

        let mut empty_budget = new_spot(0.0);
        empty_budget.name = "Dry".into();
        let err = spots.create_spot("mara", &empty_budget).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let mut greedy = new_spot(50.0);
        greedy.tax_rate = 30.0;
        let err = spots.create_spot("mara", &greedy).await.unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        let err = spots.create_spot("ghost", &new_spot(50.0)).await.unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));

        assert_eq!(balance(&pool, "mara").await, 500);
    }

    #[tokio::test]
    async fn underfunded_creation_changes_nothing() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 100).await;

        let err = manager(&pool)
            .create_spot("mara", &new_spot(200.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                required: 200,
                available: 100
            }
        ));

        assert_eq!(balance(&pool, "mara").await, 100);
        assert!(db::list_active_spots(&pool).await.unwrap().is_empty());
        let mut conn = pool.acquire().await.unwrap();
        let user = db::get_user(&mut conn, "mara").await.unwrap().unwrap();
        assert_eq!(user.xp, 0);
    }

    #[tokio::test]
    async fn takeover_transfers_the_spot_and_pays_the_old_owner() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;
        seed_user(&pool, "ada", 500).await;
        let spots = manager(&pool);

        let spot = spots.create_spot("mara", &new_spot(50.0)).await.unwrap();
        {
            // an expired shield and a live boost must both be wiped
            let mut conn = pool.acquire().await.unwrap();
            db::set_shield(&mut conn, spot.id, Utc::now() - Duration::minutes(1))
                .await
                .unwrap();
            db::set_boost(&mut conn, spot.id, Utc::now() + Duration::minutes(30), 15.0)
                .await
                .unwrap();
        }

        // remaining 50 plus the 100 premium
        let captured = spots.take_over("ada", spot.id).await.unwrap();
        assert_eq!(captured.owner_id.as_deref(), Some("ada"));
        assert_eq!(captured.shield_until, None);
        assert_eq!(captured.boost_until, None);
        assert_eq!(captured.boost_tax_rate, None);

        assert_eq!(balance(&pool, "ada").await, 350);
        // 450 after funding the spot, plus half the premium
        assert_eq!(balance(&pool, "mara").await, 500);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(db::logged_sum(&mut conn, "ada").await.unwrap(), 350);
        assert_eq!(db::logged_sum(&mut conn, "mara").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn shields_block_takeovers_until_they_expire() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;
        seed_user(&pool, "ada", 500).await;
        let spots = manager(&pool);

        let spot = spots.create_spot("mara", &new_spot(50.0)).await.unwrap();
        {
            let mut conn = pool.acquire().await.unwrap();
            db::set_shield(&mut conn, spot.id, Utc::now() + Duration::minutes(30))
                .await
                .unwrap();
        }

        let err = spots.take_over("ada", spot.id).await.unwrap_err();
        assert!(matches!(err, Error::ShieldActive { .. }));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(balance(&pool, "ada").await, 500);

        {
            let mut conn = pool.acquire().await.unwrap();
            db::set_shield(&mut conn, spot.id, Utc::now() - Duration::minutes(1))
                .await
                .unwrap();
        }
        spots.take_over("ada", spot.id).await.unwrap();
    }

    #[tokio::test]
    async fn owners_cannot_capture_their_own_spot() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;
        let spots = manager(&pool);

        // fallback ownership through creation counts
        let spot = spots.create_spot("mara", &new_spot(50.0)).await.unwrap();
        let err = spots.take_over("mara", spot.id).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyOwner(_)));
    }

    #[tokio::test]
    async fn underfunded_takeover_changes_nothing() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;
        seed_user(&pool, "ada", 100).await;
        let spots = manager(&pool);

        let spot = spots.create_spot("mara", &new_spot(50.0)).await.unwrap();
        let err = spots.take_over("ada", spot.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                required: 150,
                available: 100
            }
        ));

        let mut conn = pool.acquire().await.unwrap();
        let spot = db::get_spot(&mut conn, spot.id).await.unwrap().unwrap();
        assert_eq!(spot.resolved_owner(), Some("mara"));
        drop(conn);
        assert_eq!(balance(&pool, "ada").await, 100);
        assert_eq!(balance(&pool, "mara").await, 450);
    }

    struct RecordingPush(Mutex<Vec<(String, serde_json::Value)>>);

    #[async_trait]
    impl PushSender for RecordingPush {
        async fn send(
            &self,
            token: &str,
            _title: &str,
            _body: &str,
            data: serde_json::Value,
        ) -> Result<()> {
            self.0.lock().unwrap().push((token.to_string(), data));
            Ok(())
        }
    }

    #[tokio::test]
    async fn takeover_notifies_the_ousted_owner() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;
        seed_user(&pool, "ada", 500).await;
        {
            let mut conn = pool.acquire().await.unwrap();
            db::set_push_token(&mut conn, "mara", Some("mara-device")).await.unwrap();
        }

        let recorder = Arc::new(RecordingPush(Mutex::new(Vec::new())));
        let spots = OwnershipManager::new(pool.clone(), recorder.clone());

        let spot = spots.create_spot("mara", &new_spot(50.0)).await.unwrap();
        spots.take_over("ada", spot.id).await.unwrap();

        // delivery is spawned off the request path
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "mara-device");
        assert_eq!(sent[0].1["type"], "takeover");
        assert_eq!(sent[0].1["newOwner"], "ada");
    }

    #[tokio::test]
    async fn modifiers_are_owner_only_purchases() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 500).await;
        seed_user(&pool, "ada", 500).await;
        let spots = manager(&pool);

        let spot = spots.create_spot("mara", &new_spot(50.0)).await.unwrap();

        let err = spots.activate_shield("ada", spot.id).await.unwrap_err();
        assert!(matches!(err, Error::NotSpotOwner(_)));
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let shielded = spots.activate_shield("mara", spot.id).await.unwrap();
        assert!(shielded.shield_until.unwrap() > Utc::now());
        // 450 after creation, minus the 150 shield
        assert_eq!(balance(&pool, "mara").await, 300);

        let boosted = spots.activate_boost("mara", spot.id).await.unwrap();
        assert!(boosted.boost_until.unwrap() > Utc::now());
        assert_eq!(boosted.boost_tax_rate, Some(15.0));
        assert_eq!(balance(&pool, "mara").await, 200);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(db::logged_sum(&mut conn, "mara").await.unwrap(), 200);
    }

    #[tokio::test]
    async fn concurrent_creations_cannot_overdraw() {
        let pool = test_pool().await;
        seed_user(&pool, "mara", 100).await;
        let spots = manager(&pool);

        let (first, second) = (new_spot(60.0), new_spot(60.0));
        let (a, b) = tokio::join!(
            spots.create_spot("mara", &first),
            spots.create_spot("mara", &second),
        );

        // the conditional debit admits exactly one of the two
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(balance(&pool, "mara").await, 40);
        assert_eq!(db::list_active_spots(&pool).await.unwrap().len(), 1);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(db::logged_sum(&mut conn, "mara").await.unwrap(), 40);
    }
}
