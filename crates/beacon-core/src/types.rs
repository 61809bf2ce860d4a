//! Shared types and OpenAPI schemas.
//!
//! These are the per-cycle values that flow through the pipeline:
//! a [`BeaconReading`] is built from each scanner snapshot, ranked by the
//! selector and classified into a [`ProximityZone`] when a row is written.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Compound identifier of a beacon inside a region.
///
/// The pair is opaque: it is compared and printed, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct BeaconId {
    /// First identifier part.
    #[schema(example = 12)]
    pub major: u16,

    /// Second identifier part.
    #[schema(example = 7)]
    pub minor: u16,
}

impl BeaconId {
    /// Create a new compound identifier.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// Both parts concatenated without a separator, as written to the log.
impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.major, self.minor)
    }
}

/// One detected beacon in a single ranging cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BeaconReading {
    /// Beacon identity.
    pub id: BeaconId,

    /// Estimated distance in meters.
    #[schema(example = 0.42)]
    pub distance_m: f64,
}

impl BeaconReading {
    /// Create a reading for `id` at `distance_m` meters.
    #[must_use]
    pub const fn new(id: BeaconId, distance_m: f64) -> Self {
        Self { id, distance_m }
    }
}

/// Proximity zone derived from a distance estimate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProximityZone {
    /// Up to half a meter.
    Near,
    /// Up to two meters.
    Medium,
    /// Everything else.
    Far,
}

impl ProximityZone {
    /// Label written to the REGION column of the session log.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Near => "nah",
            Self::Medium => "mittel",
            Self::Far => "fern",
        }
    }
}

impl fmt::Display for ProximityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_id_concatenates_parts() {
        assert_eq!(BeaconId::new(12, 7).to_string(), "127");
        assert_eq!(BeaconId::new(0, 0).to_string(), "00");
        assert_eq!(BeaconId::new(65535, 1).to_string(), "655351");
    }

    #[test]
    fn test_zone_ordering() {
        assert!(ProximityZone::Near < ProximityZone::Medium);
        assert!(ProximityZone::Medium < ProximityZone::Far);
    }

    #[test]
    fn test_zone_labels() {
        assert_eq!(ProximityZone::Near.label(), "nah");
        assert_eq!(ProximityZone::Medium.label(), "mittel");
        assert_eq!(ProximityZone::Far.to_string(), "fern");
    }

    #[test]
    fn test_zone_serialization() {
        let json = serde_json::to_string(&ProximityZone::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}
