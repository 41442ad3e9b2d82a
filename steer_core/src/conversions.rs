//! `From` implementations bridging `steer_config` types to `steer_core` types.

use crate::calibration::{AngleScale, CalibrationCfg};
use crate::controller::ControllerBuilder;
use crate::error::BuildError;
use crate::profile::MotionLimits;
use crate::state::StateTable;
use crate::tracker::TrackingCfg;
use crate::util::period_from_ms;
use std::time::Duration;

// ── StateTable ───────────────────────────────────────────────────────────────

impl From<steer_config::StateTableKind> for StateTable {
    fn from(k: steer_config::StateTableKind) -> Self {
        match k {
            steer_config::StateTableKind::Legacy => StateTable::Legacy,
            steer_config::StateTableKind::Uniform => StateTable::Uniform,
        }
    }
}

// ── Motion ───────────────────────────────────────────────────────────────────

impl TryFrom<&steer_config::MotionCfg> for MotionLimits {
    type Error = BuildError;

    fn try_from(c: &steer_config::MotionCfg) -> Result<Self, Self::Error> {
        MotionLimits::from_revolution(c.t_max_s, c.counts_per_rev, c.max_acceleration)
    }
}

impl From<&steer_config::MotionCfg> for TrackingCfg {
    fn from(c: &steer_config::MotionCfg) -> Self {
        Self {
            sample_period: period_from_ms(c.sample_period_ms),
            max_following_error: c.max_following_error,
            record_history: false,
        }
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<&steer_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &steer_config::CalibrationCfg) -> Self {
        Self {
            sample_period: period_from_ms(c.sample_period_ms),
            scale: AngleScale {
                qc_to_delta: c.qc_to_delta,
                max_angle: c.max_angle_deg,
            },
            result_timeout: Duration::from_millis(c.result_timeout_ms),
        }
    }
}

// ── Whole config ─────────────────────────────────────────────────────────────

impl<C, K> ControllerBuilder<C, K> {
    /// Apply motion, calibration and state-table settings from a loaded config.
    pub fn config(self, cfg: &steer_config::Config) -> Result<Self, BuildError> {
        let limits = MotionLimits::try_from(&cfg.motion)?;
        Ok(self
            .state_table(cfg.state_machine.table.into())
            .limits(limits)
            .tracking(TrackingCfg::from(&cfg.motion))
            .calibration(CalibrationCfg::from(&cfg.calibration)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_maps_to_default_runtime_types() {
        let cfg = steer_config::Config::default();
        assert_eq!(MotionLimits::try_from(&cfg.motion).unwrap(), MotionLimits::default());
        assert_eq!(TrackingCfg::from(&cfg.motion), TrackingCfg::default());
        assert_eq!(CalibrationCfg::from(&cfg.calibration), CalibrationCfg::default());
        assert_eq!(StateTable::from(cfg.state_machine.table), StateTable::Legacy);
    }

    #[test]
    fn bad_motion_section_is_build_error() {
        let motion = steer_config::MotionCfg {
            max_acceleration: 0.0,
            ..Default::default()
        };
        assert!(MotionLimits::try_from(&motion).is_err());
    }
}
