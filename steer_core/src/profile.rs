//! Jerk-limited point-to-point position profile.
//!
//! Acceleration follows a raised cosine `A/2 * (1 - cos(2*pi*t/t1))` so it
//! starts and ends at zero, a constant-velocity segment is inserted when the
//! distance is long enough to reach max speed, and deceleration mirrors the
//! acceleration phase.
use crate::error::BuildError;
use crate::util::round_to_i32;
use std::f64::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionLimits {
    /// qc/s
    pub max_speed: f64,
    /// qc/s^2
    pub max_acceleration: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        // One 14400 qc revolution in 0.2 s.
        Self {
            max_speed: 72_000.0,
            max_acceleration: 6000.0,
        }
    }
}

impl MotionLimits {
    pub fn new(max_speed: f64, max_acceleration: f64) -> Result<Self, BuildError> {
        if !(max_speed.is_finite() && max_speed > 0.0) {
            return Err(BuildError::InvalidConfig("max_speed must be > 0"));
        }
        if !(max_acceleration.is_finite() && max_acceleration > 0.0) {
            return Err(BuildError::InvalidConfig("max_acceleration must be > 0"));
        }
        Ok(Self {
            max_speed,
            max_acceleration,
        })
    }

    /// Max speed derived from the time `t_max` one encoder revolution takes.
    pub fn from_revolution(
        t_max_s: f64,
        counts_per_rev: u32,
        max_acceleration: f64,
    ) -> Result<Self, BuildError> {
        if !(t_max_s.is_finite() && t_max_s > 0.0) {
            return Err(BuildError::InvalidConfig("t_max must be > 0"));
        }
        Self::new(f64::from(counts_per_rev) / t_max_s, max_acceleration)
    }

    /// Time to ramp from rest to max speed.
    #[inline]
    pub fn t1_max(&self) -> f64 {
        2.0 * self.max_speed / self.max_acceleration
    }

    /// Distance covered by a full ramp up and down with no cruise.
    #[inline]
    pub fn max_l13(&self) -> f64 {
        2.0 * self.max_speed * self.max_speed / self.max_acceleration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProfile {
    pub p_start: i32,
    pub p_final: i32,
    /// +1.0 or -1.0
    pub sign: f64,
    pub max_acceleration: f64,
    /// End of the acceleration phase (s).
    pub t1: f64,
    /// End of the cruise phase (s); equals `t1` without cruise.
    pub t2: f64,
    /// End of the deceleration phase (s).
    pub t3: f64,
    pub cruise: bool,
}

impl MotionProfile {
    pub fn plan(p_start: i32, p_final: i32, limits: &MotionLimits) -> Self {
        let delta = f64::from(p_final) - f64::from(p_start);
        let d = delta.abs();
        let a = limits.max_acceleration;
        let max_l13 = limits.max_l13();

        let (t1, cruise_duration) = if d > max_l13 {
            let t1 = limits.t1_max();
            (t1, 2.0 * (d - max_l13) / (a * t1))
        } else {
            ((2.0 * d / a).sqrt(), 0.0)
        };
        let t2 = t1 + cruise_duration;

        Self {
            p_start,
            p_final,
            sign: if delta < 0.0 { -1.0 } else { 1.0 },
            max_acceleration: a,
            t1,
            t2,
            t3: t2 + t1,
            cruise: cruise_duration > 0.0,
        }
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.t3
    }

    #[inline]
    pub fn cruise_duration(&self) -> f64 {
        self.t2 - self.t1
    }

    /// Distance from `p_start` at elapsed time `tau`, always >= 0.
    fn travelled(&self, tau: f64) -> f64 {
        let a = self.max_acceleration;
        let t1 = self.t1;
        let k = a / 2.0 * (t1 / TAU).powi(2);
        if tau <= 0.0 {
            0.0
        } else if tau <= t1 {
            let u = TAU * tau / t1;
            k * (0.5 * u * u - (1.0 - u.cos()))
        } else if tau <= self.t2 {
            0.25 * a * t1 * t1 + 0.5 * a * t1 * (tau - t1)
        } else {
            let w = TAU * (tau - self.t2) / t1;
            0.25 * a * t1 * t1
                + 0.5 * a * t1 * self.cruise_duration()
                + k * (TAU * w - 0.5 * w * w + (1.0 - w.cos()))
        }
    }

    /// Reference position at `tau` seconds into the move. Pinned to
    /// `p_final` past `t3`.
    pub fn reference_at(&self, tau: f64) -> f64 {
        if tau > self.t3 || self.t1 <= 0.0 {
            return f64::from(self.p_final);
        }
        f64::from(self.p_start) + self.sign * self.travelled(tau)
    }

    #[inline]
    pub fn reference_qc(&self, tau: f64) -> i32 {
        if tau > self.t3 || self.t1 <= 0.0 {
            return self.p_final;
        }
        round_to_i32(self.reference_at(tau))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn short_move_has_no_cruise() {
        let p = MotionProfile::plan(0, 20_000, &MotionLimits::default());
        assert!(!p.cruise);
        assert!(close(MotionLimits::default().max_l13(), 1_728_000.0, 1e-6));
        assert!(close(p.t1, (2.0 * 20_000.0 / 6000.0f64).sqrt(), 1e-12));
        assert!(close(p.t1, 2.582, 1e-3));
        assert_eq!(p.t2, p.t1);
        assert!(close(p.t3, 2.0 * p.t1, 1e-12));
    }

    #[test]
    fn long_move_cruises_at_max_speed() {
        let limits = MotionLimits::new(1000.0, 500.0).unwrap();
        // t1_max = 4 s, max_l13 = 4000 qc
        let p = MotionProfile::plan(0, 10_000, &limits);
        assert!(p.cruise);
        assert!(close(p.t1, 4.0, 1e-12));
        assert!(close(p.cruise_duration(), 6.0, 1e-9));
        // Cruise velocity is A*t1/2 = max_speed.
        let v = p.reference_at(6.0) - p.reference_at(5.0);
        assert!(close(v, 1000.0, 1e-6));
        assert!(close(p.reference_at(p.t3), 10_000.0, 1e-6));
    }

    #[test]
    fn phase_boundaries_are_continuous() {
        let limits = MotionLimits::new(1000.0, 500.0).unwrap();
        let p = MotionProfile::plan(100, -9_900, &limits);
        for t in [p.t1, p.t2] {
            let before = p.reference_at(t - 1e-9);
            let after = p.reference_at(t + 1e-9);
            assert!(close(before, after, 1e-3), "jump at {t}: {before} vs {after}");
        }
    }

    #[test]
    fn pinned_after_end() {
        let p = MotionProfile::plan(-500, 1234, &MotionLimits::default());
        assert_eq!(p.reference_qc(p.t3 + 0.001), 1234);
        assert_eq!(p.reference_qc(1e9), 1234);
        assert_eq!(p.reference_qc(0.0), -500);
    }

    #[test]
    fn zero_distance_is_degenerate_but_defined() {
        let p = MotionProfile::plan(42, 42, &MotionLimits::default());
        assert_eq!(p.t3, 0.0);
        assert_eq!(p.reference_qc(0.0), 42);
    }

    #[test]
    fn invalid_limits_rejected() {
        assert!(MotionLimits::new(0.0, 1.0).is_err());
        assert!(MotionLimits::new(1.0, f64::NAN).is_err());
        assert!(MotionLimits::from_revolution(0.0, 14_400, 6000.0).is_err());
        let l = MotionLimits::from_revolution(0.2, 14_400, 6000.0).unwrap();
        assert!(close(l.max_speed, 72_000.0, 1e-9));
    }
}
