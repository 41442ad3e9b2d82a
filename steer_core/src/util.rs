//! Small numeric helpers shared by the planner and calibration.

/// Round to nearest (ties away from zero) and saturate into i32.
/// Non-finite input maps to 0.
#[inline]
pub fn round_to_i32(x: f64) -> i32 {
    if !x.is_finite() {
        return 0;
    }
    // `as` saturates at the i32 bounds.
    x.round() as i32
}

/// Clamp a millisecond setting into `1..=1000` and return it as a Duration.
#[inline]
pub fn period_from_ms(ms: u64) -> std::time::Duration {
    std::time::Duration::from_millis(ms.clamp(1, 1000))
}
