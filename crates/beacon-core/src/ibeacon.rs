//! iBeacon advertisement decoding and distance estimation.
//!
//! Turns raw manufacturer data and RSSI samples into [`BeaconReading`]s:
//! samples are kept per beacon for a short window, trimmed of outliers and
//! averaged, and the average is mapped to meters with a curve fitted
//! against the advertised 1 m power.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::scanner::Region;
use crate::types::{BeaconId, BeaconReading};

/// Bluetooth SIG company identifier of Apple, carrier of iBeacon frames.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];
const IBEACON_LEN: usize = 23;

/// Decoded iBeacon advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertisement {
    /// Proximity UUID.
    pub proximity_uuid: Uuid,
    /// Compound identifier.
    pub id: BeaconId,
    /// Calibrated RSSI at one meter, in dBm.
    pub tx_power: i8,
}

/// Decode the Apple manufacturer data payload of an advertisement.
///
/// Returns `None` for anything that is not an iBeacon frame.
#[must_use]
pub fn parse_ibeacon(data: &[u8]) -> Option<Advertisement> {
    if data.len() != IBEACON_LEN || data[..2] != IBEACON_PREFIX {
        return None;
    }

    let uuid_bytes: [u8; 16] = data[2..18].try_into().ok()?;
    let major = u16::from_be_bytes([data[18], data[19]]);
    let minor = u16::from_be_bytes([data[20], data[21]]);
    let tx_power = i8::from_be_bytes([data[22]]);

    Some(Advertisement {
        proximity_uuid: Uuid::from_bytes(uuid_bytes),
        id: BeaconId::new(major, minor),
        tx_power,
    })
}

/// Estimate the distance in meters for an RSSI given the 1 m power.
///
/// Returns `None` when either value is zero (no measurement).
#[must_use]
pub fn estimate_distance(rssi: f64, tx_power: i8) -> Option<f64> {
    if rssi == 0.0 || tx_power == 0 {
        return None;
    }

    let ratio = rssi / f64::from(tx_power);
    if ratio < 1.0 {
        Some(ratio.powi(10))
    } else {
        Some(0.899_76f64.mul_add(ratio.powf(7.7095), 0.111))
    }
}

/// Average of the samples after dropping the top and bottom 10%.
fn trimmed_mean(samples: impl Iterator<Item = i16>) -> Option<f64> {
    let mut values: Vec<i16> = samples.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();

    let trim = values.len() / 10;
    let kept = &values[trim..values.len() - trim];
    let sum: f64 = kept.iter().map(|&v| f64::from(v)).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / kept.len() as f64;
    Some(mean)
}

#[derive(Debug)]
struct Tracked {
    tx_power: i8,
    samples: VecDeque<(Instant, i16)>,
    last_seen: Instant,
    order: u64,
}

/// Rolling per-beacon RSSI state used to answer region and ranging queries.
#[derive(Debug)]
pub struct BeaconTracker {
    sample_expiration: Duration,
    region_exit: Duration,
    beacons: HashMap<(Uuid, BeaconId), Tracked>,
    next_order: u64,
}

impl BeaconTracker {
    /// Create a tracker.
    ///
    /// * `sample_expiration` - how long an RSSI sample counts toward the average
    /// * `region_exit` - how long a beacon is remembered after its last sighting
    #[must_use]
    pub fn new(sample_expiration: Duration, region_exit: Duration) -> Self {
        Self {
            sample_expiration,
            region_exit,
            beacons: HashMap::new(),
            next_order: 0,
        }
    }

    /// Record one sighting.
    pub fn observe(&mut self, advertisement: Advertisement, rssi: i16, at: Instant) {
        let key = (advertisement.proximity_uuid, advertisement.id);
        let next_order = &mut self.next_order;
        let tracked = self.beacons.entry(key).or_insert_with(|| {
            let order = *next_order;
            *next_order += 1;
            Tracked {
                tx_power: advertisement.tx_power,
                samples: VecDeque::new(),
                last_seen: at,
                order,
            }
        });

        tracked.tx_power = advertisement.tx_power;
        tracked.samples.push_back((at, rssi));
        tracked.last_seen = tracked.last_seen.max(at);
    }

    /// Drop expired samples and forget beacons past the exit period.
    pub fn prune(&mut self, now: Instant) {
        let sample_expiration = self.sample_expiration;
        let region_exit = self.region_exit;

        self.beacons.retain(|_, tracked| {
            while tracked
                .samples
                .front()
                .is_some_and(|(at, _)| now.saturating_duration_since(*at) > sample_expiration)
            {
                tracked.samples.pop_front();
            }
            now.saturating_duration_since(tracked.last_seen) <= region_exit
        });
    }

    /// Whether any beacon of `region` was seen within the exit period.
    #[must_use]
    pub fn in_region(&self, region: &Region, now: Instant) -> bool {
        self.beacons.iter().any(|((uuid, id), tracked)| {
            region.matches(*uuid, id.major, id.minor)
                && now.saturating_duration_since(tracked.last_seen) <= self.region_exit
        })
    }

    /// Current readings for `region`, in first-seen order.
    ///
    /// Only beacons with unexpired samples and a usable distance are included.
    #[must_use]
    pub fn snapshot(&self, region: &Region, now: Instant) -> Vec<BeaconReading> {
        let mut current: Vec<(u64, BeaconReading)> = self
            .beacons
            .iter()
            .filter(|((uuid, id), _)| region.matches(*uuid, id.major, id.minor))
            .filter_map(|((_, id), tracked)| {
                let fresh = tracked
                    .samples
                    .iter()
                    .filter(|(at, _)| now.saturating_duration_since(*at) <= self.sample_expiration)
                    .map(|&(_, rssi)| rssi);
                let rssi = trimmed_mean(fresh)?;
                let distance_m = estimate_distance(rssi, tracked.tx_power)?;
                Some((tracked.order, BeaconReading::new(*id, distance_m)))
            })
            .collect();

        current.sort_by_key(|(order, _)| *order);
        current.into_iter().map(|(_, reading)| reading).collect()
    }

    /// Number of beacons currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    /// Whether no beacon is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROXIMITY_UUID;

    fn frame(uuid: Uuid, major: u16, minor: u16, tx_power: i8) -> Vec<u8> {
        let mut data = IBEACON_PREFIX.to_vec();
        data.extend_from_slice(uuid.as_bytes());
        data.extend_from_slice(&major.to_be_bytes());
        data.extend_from_slice(&minor.to_be_bytes());
        data.extend_from_slice(&tx_power.to_be_bytes());
        data
    }

    fn advertisement(minor: u16) -> Advertisement {
        Advertisement {
            proximity_uuid: DEFAULT_PROXIMITY_UUID,
            id: BeaconId::new(1, minor),
            tx_power: -59,
        }
    }

    fn region() -> Region {
        Region::new("myBeacon", DEFAULT_PROXIMITY_UUID)
    }

    #[test]
    fn test_parse_ibeacon_frame() {
        let data = frame(DEFAULT_PROXIMITY_UUID, 258, 772, -59);
        let adv = parse_ibeacon(&data).unwrap();
        assert_eq!(adv.proximity_uuid, DEFAULT_PROXIMITY_UUID);
        assert_eq!(adv.id, BeaconId::new(258, 772));
        assert_eq!(adv.tx_power, -59);
    }

    #[test]
    fn test_parse_rejects_other_frames() {
        let mut data = frame(DEFAULT_PROXIMITY_UUID, 1, 1, -59);
        data[0] = 0x10;
        assert!(parse_ibeacon(&data).is_none());

        let short = &frame(DEFAULT_PROXIMITY_UUID, 1, 1, -59)[..22];
        assert!(parse_ibeacon(short).is_none());
        assert!(parse_ibeacon(&[]).is_none());
    }

    #[test]
    fn test_distance_at_calibrated_power_is_about_one_meter() {
        let d = estimate_distance(-59.0, -59).unwrap();
        assert!((d - 1.010_76).abs() < 1e-6, "{d}");
    }

    #[test]
    fn test_distance_grows_as_signal_weakens() {
        let near = estimate_distance(-45.0, -59).unwrap();
        let far = estimate_distance(-80.0, -59).unwrap();
        assert!(near < 1.0);
        assert!(far > 5.0);
        assert!(near < far);
    }

    #[test]
    fn test_distance_unknown_without_measurement() {
        assert!(estimate_distance(0.0, -59).is_none());
        assert!(estimate_distance(-60.0, 0).is_none());
    }

    #[test]
    fn test_trimmed_mean_drops_outliers() {
        let samples = [-60, -60, -60, -60, -60, -60, -60, -60, -60, -20];
        assert_eq!(trimmed_mean(samples.into_iter()), Some(-60.0));
        assert_eq!(trimmed_mean([-50, -70].into_iter()), Some(-60.0));
        assert_eq!(trimmed_mean(std::iter::empty()), None);
    }

    #[test]
    fn test_snapshot_uses_first_seen_order() {
        let start = Instant::now();
        let mut tracker = BeaconTracker::new(Duration::from_secs(2), Duration::from_secs(10));
        tracker.observe(advertisement(3), -70, start);
        tracker.observe(advertisement(1), -50, start);
        tracker.observe(advertisement(3), -70, start + Duration::from_millis(500));

        let snapshot = tracker.snapshot(&region(), start + Duration::from_secs(1));
        let minors: Vec<u16> = snapshot.iter().map(|r| r.id.minor).collect();
        assert_eq!(minors, vec![3, 1]);
        assert!(snapshot[0].distance_m > snapshot[1].distance_m);
    }

    #[test]
    fn test_expired_samples_leave_snapshot_but_not_region() {
        let start = Instant::now();
        let mut tracker = BeaconTracker::new(Duration::from_secs(2), Duration::from_secs(10));
        tracker.observe(advertisement(1), -60, start);

        let later = start + Duration::from_secs(5);
        tracker.prune(later);
        assert!(tracker.snapshot(&region(), later).is_empty());
        assert!(tracker.in_region(&region(), later));
        assert_eq!(tracker.len(), 1);

        let much_later = start + Duration::from_secs(11);
        tracker.prune(much_later);
        assert!(!tracker.in_region(&region(), much_later));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_other_regions_are_filtered() {
        let start = Instant::now();
        let mut tracker = BeaconTracker::new(Duration::from_secs(2), Duration::from_secs(10));
        tracker.observe(
            Advertisement {
                proximity_uuid: Uuid::nil(),
                ..advertisement(1)
            },
            -60,
            start,
        );

        assert!(!tracker.in_region(&region(), start));
        assert!(tracker.snapshot(&region(), start).is_empty());
    }
}
