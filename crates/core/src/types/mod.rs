//! Shared type definitions and pure helpers

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters (haversine).
    ///
    /// Plenty accurate at check-in ranges; geofencing precision beyond
    /// this simple distance check is out of scope.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// The Sunday (UTC) starting the week that contains `ts`.
///
/// Weekly turf-war buckets are keyed by this date, so every award
/// within the same week lands on the same row.
pub fn week_start(ts: DateTime<Utc>) -> NaiveDate {
    let date = ts.date_naive();
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}
