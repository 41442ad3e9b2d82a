//! Closed-loop position tracking with the following-error cutoff.
use crate::device::{Device, OpMode};
use crate::error::{AbortReason, Report, Result, SteerError};
use crate::profile::MotionProfile;
use crate::state::{ControlCommand, DeviceState};
use std::time::Duration;
use steer_traits::{Clock, ObjectChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingCfg {
    pub sample_period: Duration,
    /// Abort threshold on |reference - actual| in qc.
    pub max_following_error: u32,
    /// Keep every sample in the report (diagnostics only).
    pub record_history: bool,
}

impl Default for TrackingCfg {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(10),
            max_following_error: 7500,
            record_history: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSample {
    /// Seconds since the loop started.
    pub elapsed: f64,
    pub reference: i32,
    /// `None` when the read failed.
    pub actual: Option<i32>,
    pub error: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    Reached,
    /// Target equals the current position; nothing was written.
    AlreadyThere,
    SafetyAbort(AbortReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionReport {
    pub outcome: MotionOutcome,
    pub target: i32,
    /// Failed position writes and reads during the loop.
    pub io_failures: u64,
    pub final_actual: Option<i32>,
    pub profile: Option<MotionProfile>,
    pub sample_count: u64,
    /// Iterations that finished after their sample deadline.
    pub missed_deadlines: u64,
    pub samples: Vec<TrackingSample>,
}

impl MotionReport {
    pub fn already_there(target: i32) -> Self {
        Self {
            outcome: MotionOutcome::AlreadyThere,
            target,
            io_failures: 0,
            final_actual: Some(target),
            profile: None,
            sample_count: 0,
            missed_deadlines: 0,
            samples: Vec::new(),
        }
    }

    pub fn is_safety_abort(&self) -> bool {
        matches!(self.outcome, MotionOutcome::SafetyAbort(_))
    }

    /// Turn a safety abort into an error for callers that only care about success.
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            MotionOutcome::SafetyAbort(reason) => Err(Report::new(SteerError::Abort(reason))),
            _ => Ok(self),
        }
    }
}

/// Bring the drive into operation enabled in position mode.
///
/// Resets a fault first if one is reported, then runs
/// shutdown -> switch on -> enable operation. Any failed transition aborts.
/// An unreadable or unknown state aborts before any control word is written.
pub fn prepare_motion<C: ObjectChannel>(device: &mut Device<C>) -> Result<(), SteerError> {
    let state = device.read_state().map_err(|e| SteerError::StateTransition {
        command: ControlCommand::Shutdown,
        reason: format!("drive state unreadable: {e}"),
    })?;
    match state {
        DeviceState::Unknown => {
            return Err(SteerError::StateTransition {
                command: ControlCommand::Shutdown,
                reason: "drive state unknown".into(),
            });
        }
        s if s.is_fault() => {
            tracing::info!(state = %s, "resetting drive fault before motion");
            device.change_state(ControlCommand::FaultReset)?;
        }
        _ => {}
    }

    match device.read_op_mode() {
        Ok(OpMode::Position) => {}
        Ok(mode) => {
            tracing::debug!(%mode, "switching to position mode");
            device.set_op_mode(OpMode::Position)?;
        }
        Err(e) => {
            tracing::debug!(error = %e, "op mode unreadable, setting position mode");
            device.set_op_mode(OpMode::Position)?;
        }
    }

    for command in [
        ControlCommand::Shutdown,
        ControlCommand::SwitchOn,
        ControlCommand::EnableOperation,
    ] {
        device.change_state(command)?;
    }
    Ok(())
}

/// Stream the profile to the drive until past its end.
///
/// Each iteration writes the rounded reference, reads the actual position and
/// checks the following error. I/O failures are counted and tolerated; a
/// failed read skips the check for that sample. Exceeding the limit issues a
/// single shutdown and ends the move with `SafetyAbort`. Once past `t3`, one
/// last write of `p_final` and one read finish the move.
pub fn track_move<C: ObjectChannel, K: Clock>(
    device: &mut Device<C>,
    clock: &K,
    profile: &MotionProfile,
    cfg: &TrackingCfg,
) -> MotionReport {
    let mut report = MotionReport {
        outcome: MotionOutcome::Reached,
        target: profile.p_final,
        io_failures: 0,
        final_actual: None,
        profile: Some(*profile),
        sample_count: 0,
        missed_deadlines: 0,
        samples: Vec::new(),
    };
    let limit = cfg.max_following_error;
    let epoch = clock.now();
    let mut k: u32 = 0;

    loop {
        let tau = clock.secs_since(epoch);
        let done = tau > profile.t3;
        let reference = profile.reference_qc(tau);

        if let Err(e) = device.write_position_setting(reference) {
            report.io_failures += 1;
            tracing::debug!(error = %e, reference, "reference write failed");
        }
        let actual = match device.read_position() {
            Ok(qc) => Some(qc),
            Err(e) => {
                report.io_failures += 1;
                tracing::debug!(error = %e, "position read failed");
                None
            }
        };
        let error = actual.map(|qc| i64::from(reference) - i64::from(qc));
        report.sample_count += 1;
        if actual.is_some() {
            report.final_actual = actual;
        }
        if cfg.record_history {
            report.samples.push(TrackingSample {
                elapsed: tau,
                reference,
                actual,
                error,
            });
        }
        tracing::trace!(tau, reference, actual = ?actual, error = ?error, "tracking sample");

        if let Some(err) = error
            && err.unsigned_abs() > u64::from(limit)
        {
            tracing::error!(
                error = err,
                limit,
                reference,
                actual = ?actual,
                "following error exceeded, shutting down"
            );
            if let Err(e) = device.change_state(ControlCommand::Shutdown) {
                tracing::error!(error = %e, "shutdown after following error failed");
            }
            report.outcome = MotionOutcome::SafetyAbort(AbortReason::FollowingError {
                error: err,
                limit,
            });
            return report;
        }

        if done {
            tracing::info!(
                goal = profile.p_final,
                actual = ?report.final_actual,
                io_failures = report.io_failures,
                samples = report.sample_count,
                "move complete"
            );
            return report;
        }

        k = k.saturating_add(1);
        let deadline = epoch + cfg.sample_period.saturating_mul(k);
        if clock.now() > deadline {
            report.missed_deadlines += 1;
        }
        clock.sleep_until(deadline);
    }
}
