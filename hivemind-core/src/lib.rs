//! HIVEMIND Core - Shared Types
//!
//! Identity and time types, role enums, the error taxonomy, configuration and
//! embedding vectors. Every other crate in the workspace depends on this one.

mod config;
mod embedding;
mod enums;
mod error;
mod identity;
mod persist;

pub use config::*;
pub use embedding::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
pub use persist::*;

use std::time::Duration;

// ============================================================================
// CLAMPING
// ============================================================================

/// Clamp a score to `[0, 1]`. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamp an `f32` score to `[0, 1]`. NaN maps to 0.
pub fn clamp_unit_f32(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamp a percentage-style level (curiosity, integrity) to `[lo, hi]`. NaN maps to `lo`.
pub fn clamp_level(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_unit_edges() {
        assert_eq!(clamp_unit(-0.5), 0.0);
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit_f32(0.25), 0.25);
    }

    #[test]
    fn test_clamp_level() {
        assert_eq!(clamp_level(150.0, 0.0, 100.0), 100.0);
        assert_eq!(clamp_level(f64::NAN, 80.0, 100.0), 80.0);
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}
