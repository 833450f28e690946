//! UTC timestamp formatting and the Julian Date / GMST / LST chain used to
//! project the reference-star catalog into the camera frame (§4.5).

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TimeError {
    #[error("could not parse '{0}' as an RFC3339 UTC timestamp")]
    BadTimestamp(String),
}

/// Renders a microsecond Unix epoch as a `YYYY-MM-DDThh:mm:ss.sssZ` UTC
/// string. This format is used verbatim as a clip directory name, so it
/// carries only millisecond precision; frame epochs are always millisecond-
/// aligned in practice, making the round trip through this string lossless.
pub fn epoch_us_to_utc_string(epoch_us: i64) -> String {
    let dt = epoch_us_to_datetime(epoch_us);
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC3339 UTC timestamp back to a microsecond Unix epoch. Accepts
/// any valid RFC3339 string (seconds, millis, or microseconds precision),
/// not only the format `epoch_us_to_utc_string` produces.
pub fn utc_string_to_epoch_us(s: &str) -> Result<i64, TimeError> {
    let dt: DateTime<Utc> = DateTime::parse_from_rfc3339(s)
        .map_err(|_| TimeError::BadTimestamp(s.to_string()))?
        .with_timezone(&Utc);
    let secs = dt.timestamp();
    let micros = dt.timestamp_subsec_micros() as i64;
    Ok(secs * 1_000_000 + micros)
}

fn epoch_us_to_datetime(epoch_us: i64) -> DateTime<Utc> {
    let secs = epoch_us.div_euclid(1_000_000);
    let micros = epoch_us.rem_euclid(1_000_000);
    Utc.timestamp_opt(secs, (micros * 1_000) as u32)
        .single()
        .expect("epoch_us within chrono's representable range")
}

/// Julian Date for a microsecond Unix epoch.
pub fn julian_date(epoch_us: i64) -> f64 {
    const UNIX_EPOCH_JD: f64 = 2_440_587.5;
    epoch_us as f64 / 86_400_000_000.0 + UNIX_EPOCH_JD
}

/// Greenwich Mean Sidereal Time, in hours, for a given Julian Date (IAU 1982
/// polynomial as used throughout the reference-star projection chain).
pub fn gmst_hours(jd: f64) -> f64 {
    let t = (jd - 2_451_545.0) / 36_525.0;
    let gmst_sec = 67_310.548_41
        + (876_600.0 * 3_600.0 + 8_640_184.812_866) * t
        + 0.093_104 * t * t
        - 6.2e-6 * t * t * t;
    let wrapped = gmst_sec.rem_euclid(86_400.0);
    wrapped / 3_600.0
}

/// Local Sidereal Time, in hours, given GMST (hours) and an east-positive
/// longitude in degrees.
pub fn lst_hours(gmst_hours: f64, longitude_deg: f64) -> f64 {
    let lst = gmst_hours + longitude_deg / 15.0;
    lst.rem_euclid(24.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn utc_string_round_trips_millisecond_aligned_epoch() {
        let epoch_us = 1_600_000_000_123_000;
        let s = epoch_us_to_utc_string(epoch_us);
        assert!(s.ends_with('Z'));
        let back = utc_string_to_epoch_us(&s).unwrap();
        assert_eq!(back, epoch_us);
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let err = utc_string_to_epoch_us("not-a-timestamp").unwrap_err();
        assert_eq!(err, TimeError::BadTimestamp("not-a-timestamp".to_string()));
    }

    #[test]
    fn gmst_matches_known_j2000_value() {
        let epoch_us = utc_string_to_epoch_us("2000-01-01T12:00:00Z").unwrap();
        let jd = julian_date(epoch_us);
        assert_abs_diff_eq!(jd, 2_451_545.0, epsilon = 1e-6);

        let gmst = gmst_hours(jd);
        assert_abs_diff_eq!(gmst, 18.697_374_558, epsilon = 1e-6);
    }

    #[test]
    fn lst_adds_east_longitude_and_wraps() {
        let gmst = 23.5;
        assert_abs_diff_eq!(lst_hours(gmst, 15.0), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(lst_hours(gmst, -15.0), 23.0, epsilon = 1e-9);
    }
}
