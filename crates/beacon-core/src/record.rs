//! Log row assembly and the fixed text conventions of the session file.
//!
//! A row is always [`FIELD_COUNT`] fields wide: date, time, device identity
//! and four `(beacon, distance, zone)` groups. Unused groups are written as
//! empty fields so the column layout never shifts.

use std::fmt;

use chrono::{DateTime, TimeZone};

use crate::proximity::classify;
use crate::selector::MAX_LOGGED_BEACONS;
use crate::types::{BeaconId, BeaconReading, ProximityZone};

/// Field delimiter of the session file.
pub const FIELD_SEPARATOR: char = ';';

/// Header row written once at the top of every session file.
pub const HEADER: &str = "DATE;TIME;PHONE;BEACON1;DISTANCE;REGION;BEACON2;DISTANCE;REGION;\
BEACON3;DISTANCE;REGION;BEACON4;DISTANCE;REGION";

/// Number of fields in every row, header included.
pub const FIELD_COUNT: usize = 3 + 3 * MAX_LOGGED_BEACONS;

/// Fractional digits kept in the DISTANCE column.
pub const DISTANCE_DECIMALS: usize = 4;

const DATE_FORMAT: &str = "%d.%m.%Y";
const TIME_FORMAT: &str = "%H:%M:%S%.3f";
const FILE_STEM_FORMAT: &str = "%d_%m_%Y %H_%M";

/// One beacon group of a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogSlot {
    /// Beacon identity.
    pub beacon: BeaconId,
    /// Distance estimate in meters.
    pub distance_m: f64,
    /// Zone the distance falls into.
    pub zone: ProximityZone,
}

/// One row of the session log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Wall-clock date of the cycle.
    pub date: String,
    /// Wall-clock time of the cycle.
    pub time: String,
    /// Identity of the observing device.
    pub device: String,
    /// Nearest-first beacon groups, at most [`MAX_LOGGED_BEACONS`].
    pub slots: Vec<LogSlot>,
}

impl LogRecord {
    /// Render the row without a trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.date, self.time, self.device
        )?;
        for index in 0..MAX_LOGGED_BEACONS {
            match self.slots.get(index) {
                Some(slot) => write!(
                    f,
                    "{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
                    slot.beacon,
                    format_distance(slot.distance_m),
                    slot.zone.label()
                )?,
                None => write!(f, "{FIELD_SEPARATOR}{FIELD_SEPARATOR}{FIELD_SEPARATOR}")?,
            }
        }
        Ok(())
    }
}

/// Build the row for one ranging cycle.
///
/// `readings` must already be ordered nearest first; anything past
/// [`MAX_LOGGED_BEACONS`] is ignored.
#[must_use]
pub fn format_record<Tz>(
    timestamp: &DateTime<Tz>,
    device: &str,
    readings: &[BeaconReading],
) -> LogRecord
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let slots = readings
        .iter()
        .take(MAX_LOGGED_BEACONS)
        .map(|reading| LogSlot {
            beacon: reading.id,
            distance_m: reading.distance_m,
            zone: classify(reading.distance_m),
        })
        .collect();

    LogRecord {
        date: timestamp.format(DATE_FORMAT).to_string(),
        time: timestamp.format(TIME_FORMAT).to_string(),
        device: sanitize_identity(device),
        slots,
    }
}

/// File stem of the session started at `started_at`.
#[must_use]
pub fn session_file_stem<Tz>(started_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    started_at.format(FILE_STEM_FORMAT).to_string()
}

/// Replace characters that would break the row layout.
#[must_use]
pub fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| match c {
            FIELD_SEPARATOR | '\r' | '\n' => '_',
            other => other,
        })
        .collect()
}

/// Format a distance with at most four fractional digits and a comma.
///
/// Rounds half up on the decimal representation of the value, drops
/// trailing zeros and always keeps the integer digit (`0,5`, `1`, `0,1235`).
#[must_use]
pub fn format_distance(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    // f64 Display never uses exponent notation
    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let kept_frac = frac_part.len().min(DISTANCE_DECIMALS);

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(kept_frac))
        .map(|b| b - b'0')
        .collect();

    let round_up = frac_part
        .as_bytes()
        .get(DISTANCE_DECIMALS)
        .is_some_and(|&b| b >= b'5');
    if round_up && increment(&mut digits) {
        digits.insert(0, 1);
    }

    let int_len = digits.len() - kept_frac;
    let (int_digits, frac_digits) = digits.split_at(int_len);
    let frac_len = frac_digits
        .iter()
        .rposition(|&d| d != 0)
        .map_or(0, |last| last + 1);

    let mut out = String::with_capacity(digits.len() + 2);
    let is_zero = digits.iter().all(|&d| d == 0);
    if value.is_sign_negative() && !is_zero {
        out.push('-');
    }
    out.extend(int_digits.iter().map(|&d| char::from(b'0' + d)));
    if frac_len > 0 {
        out.push(',');
        out.extend(frac_digits[..frac_len].iter().map(|&d| char::from(b'0' + d)));
    }
    out
}

/// Add one to the last decimal digit. Returns `true` on overflow.
fn increment(digits: &mut [u8]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit == 9 {
            *digit = 0;
        } else {
            *digit += 1;
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use chrono_tz::Europe::Berlin;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42)
    }

    fn reading(major: u16, minor: u16, distance_m: f64) -> BeaconReading {
        BeaconReading::new(BeaconId::new(major, minor), distance_m)
    }

    #[test]
    fn test_header_has_fifteen_fields() {
        assert_eq!(HEADER.split(FIELD_SEPARATOR).count(), FIELD_COUNT);
        assert!(HEADER.starts_with("DATE;TIME;PHONE;BEACON1;"));
        assert!(HEADER.ends_with("BEACON4;DISTANCE;REGION"));
    }

    #[test]
    fn test_row_width_is_fixed() {
        let all = [
            reading(1, 1, 0.1),
            reading(1, 2, 0.9),
            reading(1, 3, 2.2),
            reading(1, 4, 3.3),
        ];
        for count in 0..=all.len() {
            let line = format_record(&timestamp(), "pixel", &all[..count]).to_line();
            assert_eq!(line.split(FIELD_SEPARATOR).count(), FIELD_COUNT, "{line}");
        }
    }

    #[test]
    fn test_full_row_contents() {
        let readings = [
            reading(12, 7, 0.3),
            reading(12, 8, 0.3),
            reading(3, 1, 1.0),
            reading(40, 2, 2.5),
        ];
        let line = format_record(&timestamp(), "pixel", &readings).to_line();
        assert_eq!(
            line,
            "18.10.2026;09:05:07.042;pixel;127;0,3;nah;128;0,3;nah;31;1;mittel;402;2,5;fern"
        );
    }

    #[test]
    fn test_partial_row_pads_empty_groups() {
        let line = format_record(&timestamp(), "pixel", &[reading(5, 5, 0.12)]).to_line();
        assert_eq!(line, "18.10.2026;09:05:07.042;pixel;55;0,12;nah;;;;;;;;;");
    }

    #[test]
    fn test_extra_readings_are_ignored() {
        let readings: Vec<_> = (0..6).map(|i| reading(1, i, f64::from(i))).collect();
        let record = format_record(&timestamp(), "pixel", &readings);
        assert_eq!(record.slots.len(), MAX_LOGGED_BEACONS);
    }

    #[test]
    fn test_timestamp_uses_its_own_timezone() {
        let local = timestamp().with_timezone(&Berlin);
        let record = format_record(&local, "pixel", &[]);
        assert_eq!(record.date, "18.10.2026");
        assert_eq!(record.time, "11:05:07.042");

        let offset = FixedOffset::west_opt(10 * 3600).unwrap();
        let record = format_record(&timestamp().with_timezone(&offset), "pixel", &[]);
        assert_eq!(record.date, "17.10.2026");
        assert_eq!(record.time, "23:05:07.042");
    }

    #[test]
    fn test_device_identity_is_sanitized() {
        let record = format_record(&timestamp(), "my;phone\n", &[]);
        assert_eq!(record.device, "my_phone_");
        assert_eq!(record.to_line().split(FIELD_SEPARATOR).count(), FIELD_COUNT);
    }

    #[test]
    fn test_session_file_stem() {
        assert_eq!(session_file_stem(&timestamp()), "18_10_2026 09_05");
    }

    #[test]
    fn test_format_distance_rounds_half_up() {
        assert_eq!(format_distance(0.123_456), "0,1235");
        assert_eq!(format_distance(0.123_45), "0,1235");
        assert_eq!(format_distance(0.123_44), "0,1234");
        assert_eq!(format_distance(1.000_05), "1,0001");
    }

    #[test]
    fn test_format_distance_drops_trailing_zeros() {
        assert_eq!(format_distance(1.0), "1");
        assert_eq!(format_distance(2.5), "2,5");
        assert_eq!(format_distance(0.5), "0,5");
        assert_eq!(format_distance(0.0), "0");
        assert_eq!(format_distance(12.100_04), "12,1");
    }

    #[test]
    fn test_format_distance_carries_into_integer() {
        assert_eq!(format_distance(0.999_95), "1");
        assert_eq!(format_distance(9.999_99), "10");
        assert_eq!(format_distance(99.999_96), "100");
    }

    #[test]
    fn test_format_distance_negative_values() {
        assert_eq!(format_distance(-1.234_56), "-1,2346");
        assert_eq!(format_distance(-0.000_01), "0");
        assert_eq!(format_distance(-0.0), "0");
    }

    #[test]
    fn test_format_distance_non_finite() {
        assert_eq!(format_distance(f64::NAN), "NaN");
        assert_eq!(format_distance(f64::INFINITY), "inf");
        assert_eq!(format_distance(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_format_distance_tiny_and_large() {
        assert_eq!(format_distance(1e-7), "0");
        assert_eq!(format_distance(0.000_06), "0,0001");
        assert_eq!(format_distance(1e21), "1000000000000000000000");
    }
}
