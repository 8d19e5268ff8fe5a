//! Great-circle distance and location consistency checks.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two `(lat, lon)` points in degrees.
///
/// Returns `f64::INFINITY` for NaN or out-of-range inputs. Callers treat an
/// infinite distance as "cannot compare".
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if !valid_coordinate(lat1, lon1) || !valid_coordinate(lat2, lon2) {
        return f64::INFINITY;
    }

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1.0 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether a coordinate is finite and within the valid latitude/longitude ranges.
pub fn valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// How well an image position agrees with the agent's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationConsistency {
    Consistent,
    PossiblyConsistent,
    Inconsistent,
    Unknown,
}

impl LocationConsistency {
    /// Classify a distance against the consistent and possibly-consistent bounds.
    pub fn classify(distance_m: f64, consistent_within: f64, possible_within: f64) -> Self {
        if !distance_m.is_finite() {
            LocationConsistency::Inconsistent
        } else if distance_m <= consistent_within {
            LocationConsistency::Consistent
        } else if distance_m <= possible_within {
            LocationConsistency::PossiblyConsistent
        } else {
            LocationConsistency::Inconsistent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationConsistency::Consistent => "consistent",
            LocationConsistency::PossiblyConsistent => "possibly consistent",
            LocationConsistency::Inconsistent => "inconsistent",
            LocationConsistency::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LocationConsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
