//! Distance to proximity zone classification.

use crate::types::ProximityZone;

/// Upper bound (inclusive) of the near zone, in meters.
pub const NEAR_MAX_M: f64 = 0.5;

/// Upper bound (inclusive) of the medium zone, in meters.
pub const MEDIUM_MAX_M: f64 = 2.0;

/// Classify a distance estimate.
///
/// `0 <= d <= 0.5` is near, `0.5 < d <= 2.0` is medium, anything else
/// (including negative and NaN inputs) is far.
#[must_use]
pub fn classify(distance_m: f64) -> ProximityZone {
    if (0.0..=NEAR_MAX_M).contains(&distance_m) {
        ProximityZone::Near
    } else if distance_m > NEAR_MAX_M && distance_m <= MEDIUM_MAX_M {
        ProximityZone::Medium
    } else {
        ProximityZone::Far
    }
}
