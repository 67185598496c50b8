//! Numeric formatting utilities for display values and limits.
//!
//! Every function accepts a [`Raw`] input - a number, a numeric string, or a
//! missing value - and a decimal-place count. Invalid input never panics and
//! never errors: the raw variants yield `None` and the formatted variants
//! yield the empty string, so callers can render "nothing" for a value that
//! has not arrived yet or cannot be parsed.
//!
//! The rounding core scales by `10^decimals`, applies the rounding mode, and
//! descales. A machine-epsilon nudge is added before scaling so that exact
//! decimal inputs land on the intended side of the half boundary despite
//! binary floating-point representation error:
//!
//! ```
//! use ophyd_field::numfmt::{round_float, formatted_round_float};
//!
//! assert_eq!(round_float(13.005, 2), Some(13.01));
//! assert_eq!(round_float(13.00499, 2), Some(13.0));
//! assert_eq!(formatted_round_float(13.005, 2), "13.01");
//! ```

/// A value as delivered by an upstream feed: a number, a numeric string,
/// or nothing at all.
#[derive(Clone, Debug, PartialEq)]
pub enum Raw {
    /// A plain numeric value.
    Number(f64),
    /// A string that may or may not parse as a float.
    Text(String),
    /// No value (the upstream feed has not delivered one).
    Missing,
}

impl From<f64> for Raw {
    fn from(value: f64) -> Self {
        Raw::Number(value)
    }
}

impl From<&str> for Raw {
    fn from(value: &str) -> Self {
        Raw::Text(value.to_owned())
    }
}

impl From<String> for Raw {
    fn from(value: String) -> Self {
        Raw::Text(value)
    }
}

impl<T: Into<Raw>> From<Option<T>> for Raw {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Raw::Missing,
        }
    }
}

/// Validate and normalize a raw input to a float.
///
/// Missing values and strings that do not parse as a float are rejected.
fn validate(value: &Raw) -> Option<f64> {
    match value {
        Raw::Number(n) => Some(*n),
        Raw::Text(s) => s.trim().parse::<f64>().ok(),
        Raw::Missing => None,
    }
}

/// Negative decimal counts behave as zero.
fn clamp_decimals(decimals: i32) -> i32 {
    decimals.max(0)
}

fn round_core(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    ((value + f64::EPSILON) * scale).round() / scale
}

fn floor_core(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    ((value + f64::EPSILON) * scale).floor() / scale
}

fn ceil_core(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    ((value + f64::EPSILON) * scale).ceil() / scale
}

fn apply(
    value: impl Into<Raw>,
    decimals: i32,
    core: impl Fn(f64, i32) -> f64,
) -> Option<f64> {
    let parsed = validate(&value.into())?;
    Some(core(parsed, clamp_decimals(decimals)))
}

fn apply_formatted(
    value: impl Into<Raw>,
    decimals: i32,
    core: impl Fn(f64, i32) -> f64,
) -> String {
    let decimals = clamp_decimals(decimals);
    match validate(&value.into()) {
        Some(parsed) => format!("{:.*}", decimals as usize, core(parsed, decimals)),
        None => String::new(),
    }
}

/// Round to `decimals` decimal places.
///
/// `round_float(13.005, 2)` is `Some(13.01)`; `round_float(13.00499, 2)` is
/// `Some(13.0)`. Invalid input yields `None`.
pub fn round_float(value: impl Into<Raw>, decimals: i32) -> Option<f64> {
    apply(value, decimals, round_core)
}

/// Round and render with exactly `decimals` digits after the point.
///
/// `formatted_round_float(13.005, 2)` is `"13.01"`. Invalid input yields the
/// empty string.
pub fn formatted_round_float(value: impl Into<Raw>, decimals: i32) -> String {
    apply_formatted(value, decimals, round_core)
}

/// Floor to `decimals` decimal places.
///
/// `floor_float(13.0909090909, 2)` is `Some(13.09)`.
pub fn floor_float(value: impl Into<Raw>, decimals: i32) -> Option<f64> {
    apply(value, decimals, floor_core)
}

/// Floor and render with exactly `decimals` digits after the point.
pub fn formatted_floor_float(value: impl Into<Raw>, decimals: i32) -> String {
    apply_formatted(value, decimals, floor_core)
}

/// Ceil to `decimals` decimal places.
///
/// `ceil_float(13.0909090909, 2)` is `Some(13.1)`.
pub fn ceil_float(value: impl Into<Raw>, decimals: i32) -> Option<f64> {
    apply(value, decimals, ceil_core)
}

/// Ceil and render with exactly `decimals` digits after the point.
pub fn formatted_ceil_float(value: impl Into<Raw>, decimals: i32) -> String {
    apply_formatted(value, decimals, ceil_core)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_yields_none_or_blank() {
        assert_eq!(round_float(None::<f64>, 2), None);
        assert_eq!(round_float("not a number", 2), None);
        assert_eq!(floor_float(None::<f64>, 2), None);
        assert_eq!(ceil_float("13..5", 2), None);

        assert_eq!(formatted_round_float(None::<f64>, 2), "");
        assert_eq!(formatted_floor_float("garbage", 2), "");
        assert_eq!(formatted_ceil_float(None::<&str>, 2), "");
    }

    #[test]
    fn epsilon_correction_at_the_half_boundary() {
        assert_eq!(round_float(13.005, 2), Some(13.01));
        assert_eq!(round_float(13.00499, 2), Some(13.0));
    }

    #[test]
    fn formatted_round_keeps_trailing_digits() {
        assert_eq!(formatted_round_float(13.005, 2), "13.01");
        assert_eq!(formatted_round_float(13.00499, 2), "13.00");
        assert_eq!(formatted_round_float(13.0, 2), "13.00");
    }

    #[test]
    fn floor_and_ceil_at_two_decimals() {
        assert_eq!(floor_float(13.0909090909, 2), Some(13.09));
        assert_eq!(ceil_float(13.0909090909, 2), Some(13.1));
        assert_eq!(formatted_floor_float(13.0909090909, 2), "13.09");
        assert_eq!(formatted_ceil_float(13.0909090909, 2), "13.10");
    }

    #[test]
    fn floor_does_not_overshoot_at_higher_precision() {
        assert_eq!(floor_float(13.0049987, 4), Some(13.0049));
        assert_eq!(ceil_float(13.0048187, 4), Some(13.0049));
    }

    #[test]
    fn negative_decimals_behave_as_zero() {
        assert_eq!(round_float(13.4, -3), round_float(13.4, 0));
        assert_eq!(floor_float(13.9, -1), floor_float(13.9, 0));
        assert_eq!(ceil_float(13.1, -7), ceil_float(13.1, 0));
        assert_eq!(formatted_round_float(13.4, -3), "13");
    }

    #[test]
    fn numeric_strings_are_accepted() {
        assert_eq!(round_float("13.005", 2), Some(13.01));
        assert_eq!(formatted_round_float("0.192193814", 3), "0.192");
        assert_eq!(round_float(" 42.5 ", 0), Some(43.0));
    }
}
