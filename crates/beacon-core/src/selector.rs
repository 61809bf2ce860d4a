//! Selection of the closest beacons in a ranging cycle.

use crate::types::BeaconReading;

/// Number of beacon slots in a log row.
pub const MAX_LOGGED_BEACONS: usize = 4;

/// Return the `limit` closest readings, nearest first.
///
/// The sort is stable, so readings at equal distance keep their snapshot
/// order. A NaN distance of either sign sorts after every finite one. The
/// input is left untouched.
#[must_use]
pub fn select(detected: &[BeaconReading], limit: usize) -> Vec<BeaconReading> {
    let mut selected = detected.to_vec();
    selected.sort_by(|a, b| sort_key(a).total_cmp(&sort_key(b)));
    selected.truncate(limit);
    selected
}

fn sort_key(reading: &BeaconReading) -> f64 {
    if reading.distance_m.is_nan() {
        f64::INFINITY
    } else {
        reading.distance_m
    }
}
