//! Spot models - claimable locations with a drainable point budget

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::GeoPoint;

/// A claimable geographic spot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spot {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Original creator; spots seeded by the game itself have none
    pub creator_id: Option<String>,
    /// Current owner; ownership resolution falls back to the creator
    pub owner_id: Option<String>,
    pub total_points: f64,
    /// Remaining budget; fractional because each tick drains a fraction.
    /// May dip below zero by at most one tick's increment.
    pub remaining_points: f64,
    pub rate_per_minute: f64,
    /// Owner tax in percent (5.0 = 5%)
    pub tax_rate: f64,
    /// One unit per settled heartbeat; drives the spot level
    pub activity: i64,
    pub level: i64,
    /// Capture immunity until this instant, if set
    pub shield_until: Option<DateTime<Utc>>,
    /// Boosted tax window until this instant, if set
    pub boost_until: Option<DateTime<Utc>>,
    /// Tax percent in effect while the boost window is open
    pub boost_tax_rate: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Spot {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Current owner: the explicit owner, else the original creator.
    pub fn resolved_owner(&self) -> Option<&str> {
        self.owner_id.as_deref().or(self.creator_id.as_deref())
    }

    /// A spot is depleted once its remaining budget reaches zero.
    pub fn is_depleted(&self) -> bool {
        self.remaining_points <= 0.0
    }

    pub fn shield_active(&self, now: DateTime<Utc>) -> bool {
        self.shield_until.map_or(false, |until| until > now)
    }

    pub fn boost_active(&self, now: DateTime<Utc>) -> bool {
        self.boost_until.map_or(false, |until| until > now)
    }

    /// Tax rate in effect at `now`, as a fraction (0.05 = 5%).
    ///
    /// The boosted rate applies only while the boost window is open;
    /// a boost row without a stored rate falls back to the base rate.
    pub fn effective_tax_fraction(&self, now: DateTime<Utc>) -> f64 {
        let percent = if self.boost_active(now) {
            self.boost_tax_rate.unwrap_or(self.tax_rate)
        } else {
            self.tax_rate
        };
        percent / 100.0
    }
}

/// Parameters for creating a new spot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSpot {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Initial point budget; the creator's wallet funds this
    pub budget: f64,
    pub rate_per_minute: f64,
    pub tax_rate: f64,
}
