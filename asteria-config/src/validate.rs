//! Pure parameter validation: `&str -> Result<T, ValidationError>` (§9).
//!
//! Both functions here correct bugs the source's validators carry: range
//! checks use closed intervals `[lower, upper]` rather than rejecting the
//! boundary (open question 3), and multiple-choice parsing accepts a value
//! iff it equals one of the listed options, rather than the source's
//! inverted `compare() != 0` check (open question 1).

use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("could not parse '{value}' as the expected type: {reason}")]
    Unparseable { value: String, reason: String },
    #[error("value {value} is outside the closed range [{lower}, {upper}]")]
    OutOfRange { value: String, lower: String, upper: String },
    #[error("'{value}' is not one of the allowed options: {options:?}")]
    NotAnOption { value: String, options: Vec<String> },
}

/// Parses `value` and checks it falls within the closed interval
/// `[lower, upper]`, inclusive on both ends.
pub fn validate_range<T>(value: &str, lower: T, upper: T) -> Result<T, ValidationError>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let parsed: T = value
        .parse()
        .map_err(|_| ValidationError::Unparseable { value: value.to_string(), reason: "not a valid number".to_string() })?;

    if parsed < lower || parsed > upper {
        return Err(ValidationError::OutOfRange {
            value: parsed.to_string(),
            lower: lower.to_string(),
            upper: upper.to_string(),
        });
    }
    Ok(parsed)
}

/// Accepts `value` iff it equals, byte-for-byte, one of `options`.
pub fn validate_option(value: &str, options: &[&str]) -> Result<String, ValidationError> {
    if options.iter().any(|&opt| opt == value) {
        Ok(value.to_string())
    } else {
        Err(ValidationError::NotAnOption {
            value: value.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_accepts_both_boundary_values() {
        assert_eq!(validate_range::<f64>("0.0", 0.0, 10.0), Ok(0.0));
        assert_eq!(validate_range::<f64>("10.0", 0.0, 10.0), Ok(10.0));
    }

    #[test]
    fn range_rejects_outside_values() {
        assert!(validate_range::<f64>("-0.001", 0.0, 10.0).is_err());
        assert!(validate_range::<f64>("10.001", 0.0, 10.0).is_err());
    }

    #[test]
    fn range_rejects_unparseable_input() {
        let err = validate_range::<f64>("not-a-number", 0.0, 10.0).unwrap_err();
        assert!(matches!(err, ValidationError::Unparseable { .. }));
    }

    #[test]
    fn option_accepts_exact_match_only() {
        assert_eq!(validate_option("gui", &["headless", "gui"]), Ok("gui".to_string()));
        assert!(validate_option("GUI", &["headless", "gui"]).is_err());
        assert!(validate_option("grape", &["headless", "gui"]).is_err());
    }
}
