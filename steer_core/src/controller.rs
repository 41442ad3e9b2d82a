//! `SteeringController`: the one owner of the drive.
//!
//! The device is either held here or lent to a running calibration worker,
//! never both, so calibration and motion cannot overlap.
use crate::calibration::{Calibration, CalibrationCfg, CalibrationRun, release_torque};
use crate::device::Device;
use crate::error::{BuildError, Report, Result, SteerError};
use crate::profile::{MotionLimits, MotionProfile};
use crate::state::{ControlCommand, DeviceState, StateTable};
use crate::tracker::{MotionReport, TrackingCfg, prepare_motion, track_move};
use eyre::WrapErr;
use steer_traits::{Clock, MonotonicClock, ObjectChannel};

/// Motion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// Absolute position in qc.
    Position(i32),
    /// Steering angle in degrees.
    Angle(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSummary {
    pub calibration: Calibration,
    pub samples: u64,
    pub failures: u64,
}

pub struct SteeringController<C, K = MonotonicClock> {
    device: Option<Device<C>>,
    run: Option<CalibrationRun<C>>,
    calibration: Option<Calibration>,
    clock: K,
    limits: MotionLimits,
    tracking: TrackingCfg,
    calibration_cfg: CalibrationCfg,
}

pub struct ControllerBuilder<C, K> {
    device: Device<C>,
    clock: K,
    limits: MotionLimits,
    tracking: TrackingCfg,
    calibration_cfg: CalibrationCfg,
}

impl<C> SteeringController<C, MonotonicClock> {
    pub fn builder(device: Device<C>) -> ControllerBuilder<C, MonotonicClock> {
        ControllerBuilder {
            device,
            clock: MonotonicClock::new(),
            limits: MotionLimits::default(),
            tracking: TrackingCfg::default(),
            calibration_cfg: CalibrationCfg::default(),
        }
    }
}

impl<C, K> ControllerBuilder<C, K> {
    pub fn clock<K2>(self, clock: K2) -> ControllerBuilder<C, K2> {
        ControllerBuilder {
            device: self.device,
            clock,
            limits: self.limits,
            tracking: self.tracking,
            calibration_cfg: self.calibration_cfg,
        }
    }

    pub fn state_table(mut self, table: StateTable) -> Self {
        self.device = self.device.with_state_table(table);
        self
    }

    pub fn limits(mut self, limits: MotionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn tracking(mut self, tracking: TrackingCfg) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn calibration(mut self, cfg: CalibrationCfg) -> Self {
        self.calibration_cfg = cfg;
        self
    }

    pub fn try_build(self) -> Result<SteeringController<C, K>, BuildError> {
        if self.tracking.sample_period.is_zero() {
            return Err(BuildError::InvalidConfig("tracking sample period must be > 0"));
        }
        if self.tracking.max_following_error == 0 {
            return Err(BuildError::InvalidConfig("max following error must be > 0"));
        }
        if self.calibration_cfg.sample_period.is_zero() {
            return Err(BuildError::InvalidConfig("calibration sample period must be > 0"));
        }
        if self.calibration_cfg.result_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("calibration result timeout must be > 0"));
        }
        let scale = self.calibration_cfg.scale;
        if !scale.qc_to_delta.is_finite() || scale.qc_to_delta == 0.0 {
            return Err(BuildError::InvalidConfig("qc_to_delta must be finite and non-zero"));
        }
        if !(scale.max_angle.is_finite() && scale.max_angle > 0.0) {
            return Err(BuildError::InvalidConfig("max angle must be > 0"));
        }
        // Re-validate limits that may have been built by hand.
        let limits = MotionLimits::new(self.limits.max_speed, self.limits.max_acceleration)?;
        Ok(SteeringController {
            device: Some(self.device),
            run: None,
            calibration: None,
            clock: self.clock,
            limits,
            tracking: self.tracking,
            calibration_cfg: self.calibration_cfg,
        })
    }
}

impl<C, K> SteeringController<C, K>
where
    C: ObjectChannel + Send + 'static,
    K: Clock + Clone + Send + 'static,
{
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn is_calibrating(&self) -> bool {
        self.run.is_some()
    }

    pub fn limits(&self) -> &MotionLimits {
        &self.limits
    }

    pub fn tracking(&self) -> &TrackingCfg {
        &self.tracking
    }

    pub fn device_mut(&mut self) -> Result<&mut Device<C>, SteerError> {
        if self.run.is_some() {
            return Err(SteerError::DeviceBusy("calibration in progress"));
        }
        self.device.as_mut().ok_or_else(|| {
            SteerError::DeviceUnavailable("drive lost to a stalled calibration".into())
        })
    }

    pub fn read_state(&mut self) -> Result<DeviceState> {
        Ok(self.device_mut()?.read_state()?)
    }

    /// Current steering angle from a fresh position read.
    pub fn current_angle(&mut self) -> Result<f64> {
        let cal = self.calibration.ok_or(SteerError::NotCalibrated)?;
        let qc = self.device_mut()?.read_position()?;
        Ok(cal.angle_for_position(qc))
    }

    /// Release motor torque and start sampling on a worker thread.
    ///
    /// A successful `finish_calibration` replaces any previous calibration.
    /// A failed or cancelled run leaves it as it was.
    pub fn begin_calibration(&mut self) -> Result<()> {
        if self.run.is_some() {
            return Err(Report::new(SteerError::DeviceBusy("calibration in progress")));
        }
        let mut device = self.device.take().ok_or_else(|| {
            SteerError::DeviceUnavailable("drive lost to a stalled calibration".into())
        })?;
        if let Err(e) = release_torque(&mut device) {
            self.device = Some(device);
            return Err(Report::new(e).wrap_err("calibration precheck failed"));
        }
        tracing::info!(period = ?self.calibration_cfg.sample_period, "calibration started");
        self.run = Some(CalibrationRun::spawn(
            device,
            self.calibration_cfg,
            self.clock.clone(),
        ));
        Ok(())
    }

    /// Stop the worker, take the drive back and derive the calibration.
    pub fn finish_calibration(&mut self) -> Result<CalibrationSummary> {
        let run = self
            .run
            .take()
            .ok_or_else(|| eyre::eyre!("no calibration in progress"))?;
        let (device, tally) = run.finish()?;
        self.device = Some(device);
        let calibration = tally.into_calibration(self.calibration_cfg.scale);
        tracing::info!(
            min_value = calibration.min_value,
            max_value = calibration.max_value,
            zero_reference = calibration.zero_reference,
            samples = tally.samples,
            failures = tally.failures,
            "calibration complete"
        );
        self.calibration = Some(calibration);
        Ok(CalibrationSummary {
            calibration,
            samples: tally.samples,
            failures: tally.failures,
        })
    }

    /// Stop the worker and take the drive back without committing its samples.
    pub fn cancel_calibration(&mut self) -> Result<()> {
        let run = self
            .run
            .take()
            .ok_or_else(|| eyre::eyre!("no calibration in progress"))?;
        let (device, tally) = run.finish()?;
        self.device = Some(device);
        tracing::info!(
            samples = tally.samples,
            failures = tally.failures,
            "calibration cancelled"
        );
        Ok(())
    }

    /// Validate, plan and run one move.
    ///
    /// Validation failures return before any device I/O. A following-error
    /// abort is reported through `MotionReport::outcome`, not as an error.
    pub fn move_to(&mut self, target: Target) -> Result<MotionReport> {
        let cal = self.calibration.ok_or(SteerError::NotCalibrated)?;
        let p_final = match target {
            Target::Position(qc) => qc,
            Target::Angle(deg) => cal.position_for_angle(deg)?,
        };
        cal.check_position(p_final)?;

        let clock = self.clock.clone();
        let limits = self.limits;
        let tracking = self.tracking;
        let device = self.device_mut()?;
        let p_start = device
            .read_position()
            .wrap_err("reading start position")?;
        if p_start == p_final {
            tracing::debug!(position = p_final, "already at target");
            return Ok(MotionReport::already_there(p_final));
        }

        prepare_motion(device).wrap_err("enabling drive")?;
        let profile = MotionProfile::plan(p_start, p_final, &limits);
        tracing::info!(
            p_start,
            p_final,
            t1 = profile.t1,
            t3 = profile.t3,
            cruise = profile.cruise,
            "move planned"
        );
        Ok(track_move(device, &clock, &profile, &tracking))
    }

    /// Mirror the calibrated travel range and the following-error limit into
    /// the drive's own supervision objects.
    pub fn apply_drive_limits(&mut self) -> Result<()> {
        let cal = self.calibration.ok_or(SteerError::NotCalibrated)?;
        let limit = self.tracking.max_following_error;
        let device = self.device_mut()?;
        device
            .write_software_limits(cal.min_value, cal.max_value)
            .wrap_err("writing software position limits")?;
        device
            .write_max_following_error(limit)
            .wrap_err("writing max following error")?;
        tracing::info!(
            min = cal.min_value,
            max = cal.max_value,
            max_following_error = limit,
            "drive limits applied"
        );
        Ok(())
    }

    pub fn store_parameters(&mut self) -> Result<()> {
        self.device_mut()?.store_parameters()?;
        tracing::info!("drive parameters stored");
        Ok(())
    }

    pub fn restore_defaults(&mut self) -> Result<()> {
        self.device_mut()?.restore_defaults()?;
        tracing::info!("drive defaults restored");
        Ok(())
    }

    /// Best-effort torque release, e.g. on Ctrl+C.
    pub fn shutdown(&mut self) {
        if let Ok(dev) = self.device_mut()
            && let Err(e) = dev.change_state(ControlCommand::Shutdown)
        {
            tracing::warn!(error = %e, "shutdown failed");
        }
    }

    pub fn into_device(mut self) -> Option<Device<C>> {
        self.run.take();
        self.device.take()
    }
}
