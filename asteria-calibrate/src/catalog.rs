//! Reference-star catalog reader (§6, §9 Open Question 2).
//!
//! Plain text, one star per line, `#` comments ignored, fields separated by
//! any whitespace (not only tabs): `ra_deg dec_deg mag`. Malformed lines are
//! skipped rather than aborting the whole read.

use std::io::BufRead;

use nalgebra::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceStar {
    pub ra_rad: f64,
    pub dec_rad: f64,
    pub mag: f64,
    pub camera_unit_vector: Option<Vector3<f64>>,
    pub visible: bool,
    pub projected_pixel: Option<(f64, f64)>,
}

impl ReferenceStar {
    fn new(ra_deg: f64, dec_deg: f64, mag: f64) -> Self {
        Self {
            ra_rad: ra_deg.to_radians(),
            dec_rad: dec_deg.to_radians(),
            mag,
            camera_unit_vector: None,
            visible: false,
            projected_pixel: None,
        }
    }
}

/// Reads the catalog, skipping `#`-comment and blank lines and silently
/// dropping any line that doesn't parse as three whitespace-separated
/// numbers.
pub fn read_catalog<R: BufRead>(r: R) -> Vec<ReferenceStar> {
    let mut stars = Vec::new();
    for line in r.lines() {
        let Ok(line) = line else { continue };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let parsed = (|| -> Option<(f64, f64, f64)> {
            let ra = fields.next()?.parse().ok()?;
            let dec = fields.next()?.parse().ok()?;
            let mag = fields.next()?.parse().ok()?;
            Some((ra, dec, mag))
        })();

        match parsed {
            Some((ra_deg, dec_deg, mag)) => stars.push(ReferenceStar::new(ra_deg, dec_deg, mag)),
            None => tracing::warn!(line, "skipping malformed reference-star catalog line"),
        }
    }
    stars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whitespace_separated_lines_and_skips_comments_and_malformed() {
        let text = "# header comment\n10.5 20.25 3.2\nmalformed line here\n  \n30.0\t-5.5\t8.1\n";
        let stars = read_catalog(text.as_bytes());
        assert_eq!(stars.len(), 2);
        assert!((stars[0].ra_rad - 10.5_f64.to_radians()).abs() < 1e-12);
        assert!((stars[1].mag - 8.1).abs() < 1e-12);
    }

    #[test]
    fn tolerates_space_separated_lines_not_only_tabs() {
        let text = "1.0 2.0 3.0\n";
        let stars = read_catalog(text.as_bytes());
        assert_eq!(stars.len(), 1);
    }
}
