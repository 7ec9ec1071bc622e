//! Quest, badge, and XP progression
//!
//! Progress is never trusted from stored counters: every evaluation
//! recomputes the authoritative count (visits, earn-log sum, owned
//! spots, level) and folds it forward through the strictly one-way
//! `in_progress -> completed -> claimed` machine.

mod leveling;

pub use leveling::{add_xp, level_for_xp};

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{info, instrument};
use turfpoint_core::{
    Badge, BadgeCategory, Error, Quest, QuestCondition, QuestStatus, Result, TransactionKind,
    UserBadge, UserQuest,
};
use turfpoint_persistence::cache::QuestCache;
use turfpoint_persistence::sqlite as db;

/// Recompute progress for every active quest measuring one of
/// `conditions`, inside the caller's transaction
pub async fn sync_progress(
    conn: &mut SqliteConnection,
    user_id: &str,
    conditions: &[QuestCondition],
) -> Result<()> {
    let quests = db::list_active_quests(&mut *conn).await?;

    for condition in conditions {
        if !quests.iter().any(|q| q.condition == *condition) {
            continue;
        }
        let count = authoritative_count(&mut *conn, user_id, *condition).await?;
        for quest in quests.iter().filter(|q| q.condition == *condition) {
            let status = if count >= quest.threshold {
                QuestStatus::Completed
            } else {
                QuestStatus::InProgress
            };
            db::upsert_quest_progress(&mut *conn, user_id, quest.id, count, status).await?;
        }
    }

    Ok(())
}

/// The current truth for one quest condition
async fn authoritative_count(
    conn: &mut SqliteConnection,
    user_id: &str,
    condition: QuestCondition,
) -> Result<i64> {
    match condition {
        QuestCondition::VisitCount => db::count_user_visits(&mut *conn, user_id).await,
        QuestCondition::PointsEarned => db::earned_total(&mut *conn, user_id).await,
        QuestCondition::SpotsOwned => db::count_owned(&mut *conn, user_id).await,
        QuestCondition::LevelReached => {
            let user = db::get_user(&mut *conn, user_id)
                .await?
                .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
            Ok(user.level)
        }
    }
}

/// Unlock every badge in `category` whose threshold `count` reaches;
/// returns the freshly unlocked ones
pub async fn check_badge_unlock(
    conn: &mut SqliteConnection,
    user_id: &str,
    category: BadgeCategory,
    count: i64,
    now: DateTime<Utc>,
) -> Result<Vec<Badge>> {
    let defs = db::badges_in_category(&mut *conn, category).await?;
    let mut unlocked = Vec::new();

    // defs come back ordered by threshold
    for badge in defs {
        if count < badge.threshold {
            break;
        }
        if db::unlock_badge(&mut *conn, user_id, badge.id, now).await? {
            info!("Badge '{}' unlocked for {}", badge.title, user_id);
            unlocked.push(badge);
        }
    }

    Ok(unlocked)
}

/// Quest surface: catalog, per-user progress, and one-time claims
pub struct QuestTracker {
    pool: SqlitePool,
    cache: Arc<QuestCache>,
}

impl QuestTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cache: Arc::new(QuestCache::default()),
        }
    }

    /// Active quest definitions, served from the TTL cache when warm
    pub async fn catalog(&self) -> Result<Vec<Quest>> {
        if let Some(quests) = self.cache.get() {
            return Ok(quests);
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        let quests = db::list_active_quests(&mut conn).await?;
        self.cache.set(quests.clone());

        Ok(quests)
    }

    /// Insert a quest definition and refresh the catalog
    #[instrument(skip(self, description))]
    pub async fn create_quest(
        &self,
        title: &str,
        description: &str,
        condition: QuestCondition,
        threshold: i64,
        reward_points: i64,
    ) -> Result<Quest> {
        if title.trim().is_empty() {
            return Err(Error::InvalidData("quest title must not be empty".into()));
        }
        if threshold <= 0 {
            return Err(Error::InvalidData("quest threshold must be positive".into()));
        }
        if reward_points < 0 {
            return Err(Error::InvalidData("quest reward must not be negative".into()));
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        let quest_id = db::create_quest(
            &mut conn,
            title,
            description,
            condition,
            threshold,
            reward_points,
        )
        .await?;
        let quest = db::get_quest(&mut conn, quest_id)
            .await?
            .ok_or(Error::QuestNotFound(quest_id))?;

        self.cache.invalidate();
        info!("Quest '{}' created (#{quest_id})", title);

        Ok(quest)
    }

    /// Bring one user's progress up to the authoritative counts
    pub async fn evaluate(&self, user_id: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        if db::get_user(&mut *tx, user_id).await?.is_none() {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        sync_progress(
            &mut *tx,
            user_id,
            &[
                QuestCondition::VisitCount,
                QuestCondition::PointsEarned,
                QuestCondition::SpotsOwned,
                QuestCondition::LevelReached,
            ],
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))
    }

    /// One user's progress rows
    pub async fn quests_for(&self, user_id: &str) -> Result<Vec<UserQuest>> {
        db::list_user_quests(&self.pool, user_id).await
    }

    /// Badges one user holds
    pub async fn badges_for(&self, user_id: &str) -> Result<Vec<UserBadge>> {
        db::list_user_badges(&self.pool, user_id).await
    }

    /// Claim a completed quest's reward.
    ///
    /// The flip to `claimed`, the wallet credit, and the log entry
    /// commit together; racing claims pay at most once because the
    /// flip is a conditional update.
    #[instrument(skip(self))]
    pub async fn claim(&self, user_id: &str, quest_id: i64) -> Result<i64> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        // Try the conditional flip first; only one claim can ever win it
        let mut flipped = db::claim_quest(&mut *tx, user_id, quest_id, now).await?;

        let quest = db::get_quest(&mut *tx, quest_id)
            .await?
            .filter(|q| q.is_active)
            .ok_or(Error::QuestNotFound(quest_id))?;

        if !flipped {
            // Stored progress may be stale; recompute the condition and
            // try once more before rejecting
            if db::get_user(&mut *tx, user_id).await?.is_none() {
                return Err(Error::UserNotFound(user_id.to_string()));
            }
            let count = authoritative_count(&mut *tx, user_id, quest.condition).await?;
            let status = if count >= quest.threshold {
                QuestStatus::Completed
            } else {
                QuestStatus::InProgress
            };
            db::upsert_quest_progress(&mut *tx, user_id, quest_id, count, status).await?;
            flipped = db::claim_quest(&mut *tx, user_id, quest_id, now).await?;
        }

        if !flipped {
            let row = db::get_user_quest(&mut *tx, user_id, quest_id).await?;
            return Err(match row {
                Some(r) if r.status == QuestStatus::Claimed => Error::QuestAlreadyClaimed(quest_id),
                _ => Error::QuestNotCompleted(quest_id),
            });
        }

        db::credit_wallet(&mut *tx, user_id, quest.reward_points).await?;
        db::log_transaction(
            &mut *tx,
            user_id,
            quest.reward_points,
            TransactionKind::Earn,
            &format!("Quest reward: {}", quest.title),
            now,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!(
            "Quest #{} claimed by {} for {} points",
            quest_id, user_id, quest.reward_points
        );
        Ok(quest.reward_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_visit_for, seed_spot, seed_user, test_pool};
    use turfpoint_core::ErrorKind;

    #[tokio::test]
    async fn claim_pays_exactly_once() {
        let pool = test_pool().await;
        seed_user(&pool, "ada", 0).await;
        let spot_id = seed_spot(&pool, None, 100.0, 12.0, 0.0).await;
        open_visit_for(&pool, spot_id, "ada").await;

        let tracker = QuestTracker::new(pool.clone());
        let quest = tracker
            .create_quest("First steps", "Check in somewhere", QuestCondition::VisitCount, 1, 50)
            .await
            .unwrap();

        assert_eq!(tracker.claim("ada", quest.id).await.unwrap(), 50);

        let err = tracker.claim("ada", quest.id).await.unwrap_err();
        assert!(matches!(err, Error::QuestAlreadyClaimed(_)));
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        // credited exactly once, and the ledger agrees
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(db::get_balance(&mut conn, "ada").await.unwrap(), Some(50));
        assert_eq!(db::logged_sum(&mut conn, "ada").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn claim_requires_the_condition_to_hold() {
        let pool = test_pool().await;
        seed_user(&pool, "ada", 0).await;

        let tracker = QuestTracker::new(pool.clone());
        let quest = tracker
            .create_quest("Regular", "Check in five times", QuestCondition::VisitCount, 5, 100)
            .await
            .unwrap();

        let err = tracker.claim("ada", quest.id).await.unwrap_err();
        assert!(matches!(err, Error::QuestNotCompleted(_)));

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(db::get_balance(&mut conn, "ada").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn claim_recomputes_stale_progress() {
        let pool = test_pool().await;
        seed_user(&pool, "ada", 0).await;
        let spot_id = seed_spot(&pool, None, 100.0, 12.0, 0.0).await;

        let tracker = QuestTracker::new(pool.clone());
        let quest = tracker
            .create_quest("First steps", "", QuestCondition::VisitCount, 1, 50)
            .await
            .unwrap();

        // the visit happens after the quest exists, with no evaluation
        // in between; the claim itself must find the fresh count
        open_visit_for(&pool, spot_id, "ada").await;
        assert_eq!(tracker.claim("ada", quest.id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn evaluation_tracks_counts_without_regressing() {
        let pool = test_pool().await;
        seed_user(&pool, "ada", 0).await;
        seed_user(&pool, "rival", 500).await;

        let tracker = QuestTracker::new(pool.clone());
        let quest = tracker
            .create_quest("Landlord", "Hold two spots", QuestCondition::SpotsOwned, 2, 200)
            .await
            .unwrap();

        // ada owns two spots via creator fallback
        let first = seed_spot(&pool, Some("ada"), 50.0, 12.0, 0.0).await;
        seed_spot(&pool, Some("ada"), 50.0, 12.0, 0.0).await;
        tracker.evaluate("ada").await.unwrap();

        let row = {
            let mut conn = pool.acquire().await.unwrap();
            db::get_user_quest(&mut conn, "ada", quest.id).await.unwrap().unwrap()
        };
        assert_eq!(row.progress, 2);
        assert_eq!(row.status, QuestStatus::Completed);

        // losing a spot drops the count, but not the completion
        {
            let mut conn = pool.acquire().await.unwrap();
            db::transfer_owner(&mut conn, first, None, "rival").await.unwrap();
        }
        tracker.evaluate("ada").await.unwrap();

        let row = {
            let mut conn = pool.acquire().await.unwrap();
            db::get_user_quest(&mut conn, "ada", quest.id).await.unwrap().unwrap()
        };
        assert_eq!(row.progress, 2);
        assert_eq!(row.status, QuestStatus::Completed);
    }

    #[tokio::test]
    async fn catalog_is_cached_until_a_definition_changes() {
        let pool = test_pool().await;
        let tracker = QuestTracker::new(pool.clone());

        tracker
            .create_quest("One", "", QuestCondition::VisitCount, 1, 10)
            .await
            .unwrap();
        assert_eq!(tracker.catalog().await.unwrap().len(), 1);

        // an insert that bypasses the tracker is invisible until the TTL
        // or the next tracked insert
        {
            let mut conn = pool.acquire().await.unwrap();
            db::create_quest(&mut conn, "Two", "", QuestCondition::VisitCount, 2, 20)
                .await
                .unwrap();
        }
        assert_eq!(tracker.catalog().await.unwrap().len(), 1);

        tracker
            .create_quest("Three", "", QuestCondition::VisitCount, 3, 30)
            .await
            .unwrap();
        assert_eq!(tracker.catalog().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn badges_unlock_exactly_once() {
        let pool = test_pool().await;
        seed_user(&pool, "ada", 0).await;
        let badge_id = {
            let mut conn = pool.acquire().await.unwrap();
            db::create_badge(&mut conn, BadgeCategory::Visits, 1, "First visit").await.unwrap()
        };

        let now = Utc::now();
        let mut conn = pool.acquire().await.unwrap();
        let fresh = check_badge_unlock(&mut conn, "ada", BadgeCategory::Visits, 1, now)
            .await
            .unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, badge_id);

        let again = check_badge_unlock(&mut conn, "ada", BadgeCategory::Visits, 3, now)
            .await
            .unwrap();
        assert!(again.is_empty());

        drop(conn);
        assert_eq!(db::list_user_badges(&pool, "ada").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_definitions_are_rejected() {
        let pool = test_pool().await;
        let tracker = QuestTracker::new(pool);

        let err = tracker
            .create_quest("", "", QuestCondition::VisitCount, 1, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        // threshold zero would complete instantly for everyone
        let err = tracker
            .create_quest("Too easy", "", QuestCondition::VisitCount, 0, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }
}
