//! Quest, badge, and progress models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// What a quest measures
///
/// Count conditions are recomputed from authoritative queries at
/// evaluation time, never read from a cached counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestCondition {
    /// Total visits ever checked in
    VisitCount,
    /// Lifetime points from `earn` ledger entries
    PointsEarned,
    /// Spots currently owned (explicit owner or creator fallback)
    SpotsOwned,
    /// User level reached
    LevelReached,
}

impl QuestCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestCondition::VisitCount => "visit_count",
            QuestCondition::PointsEarned => "points_earned",
            QuestCondition::SpotsOwned => "spots_owned",
            QuestCondition::LevelReached => "level_reached",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "visit_count" => Ok(QuestCondition::VisitCount),
            "points_earned" => Ok(QuestCondition::PointsEarned),
            "spots_owned" => Ok(QuestCondition::SpotsOwned),
            "level_reached" => Ok(QuestCondition::LevelReached),
            other => Err(Error::InvalidData(format!(
                "unknown quest condition '{other}'"
            ))),
        }
    }
}

/// Lifecycle of one user's quest; strictly forward, never regresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    InProgress,
    Completed,
    Claimed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::InProgress => "in_progress",
            QuestStatus::Completed => "completed",
            QuestStatus::Claimed => "claimed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(QuestStatus::InProgress),
            "completed" => Ok(QuestStatus::Completed),
            "claimed" => Ok(QuestStatus::Claimed),
            other => Err(Error::InvalidData(format!("unknown quest status '{other}'"))),
        }
    }
}

/// A quest definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub condition: QuestCondition,
    pub threshold: i64,
    pub reward_points: i64,
    pub is_active: bool,
}

/// One user's progress against a quest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuest {
    pub user_id: String,
    pub quest_id: i64,
    pub progress: i64,
    pub status: QuestStatus,
    /// Stamped when the reward is claimed
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counter category a badge milestones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Visits,
    SpotsOwned,
    Level,
}

impl BadgeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeCategory::Visits => "visits",
            BadgeCategory::SpotsOwned => "spots_owned",
            BadgeCategory::Level => "level",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "visits" => Ok(BadgeCategory::Visits),
            "spots_owned" => Ok(BadgeCategory::SpotsOwned),
            "level" => Ok(BadgeCategory::Level),
            other => Err(Error::InvalidData(format!(
                "unknown badge category '{other}'"
            ))),
        }
    }
}

/// A badge definition: unlocked once a category counter hits the threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: i64,
    pub category: BadgeCategory,
    pub threshold: i64,
    pub title: String,
}

/// A badge a user holds; unlocked exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBadge {
    pub user_id: String,
    pub badge_id: i64,
    pub unlocked_at: DateTime<Utc>,
}
