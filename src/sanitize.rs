//! Numeric coercion helpers.
//!
//! Snapshot rows arrive with nullable, possibly non-finite or out-of-range
//! numbers. These helpers coerce them to safe values instead of failing.

/// Clamp `value` into `[min, max]`. Non-finite input falls to `min`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.max(min).min(max)
}

/// Clamp into the unit interval `[0, 1]`.
pub fn clamp_unit(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

/// Round to 2 decimal places (half away from zero).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to 1 decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
