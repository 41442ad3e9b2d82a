use crate::state::ControlCommand;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SteerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout waiting for drive")]
    Timeout,
    #[error("drive aborted transfer 0x{code:08X}: {text}")]
    SdoAbort { code: u32, text: String },
    #[error("unexpected payload from {object}: expected {expected} bytes, got {got}")]
    Payload {
        object: String,
        expected: usize,
        got: usize,
    },
    #[error("state transition '{command}' failed: {reason}")]
    StateTransition {
        command: ControlCommand,
        reason: String,
    },
    #[error("device is not calibrated")]
    NotCalibrated,
    #[error("angle {angle:.3} deg outside [-{max}, {max}] deg")]
    AngleOutOfRange { angle: f64, max: f64 },
    #[error("position {position} qc outside calibrated range [{min}, {max}]")]
    PositionOutOfRange { position: i32, min: i32, max: i32 },
    #[error("unknown operation mode {0}")]
    UnknownOpMode(i8),
    #[error("calibration result not received within {0:?}")]
    CalibrationTimeout(Duration),
    #[error("calibration worker terminated abnormally")]
    CalibrationWorker,
    #[error("device busy: {0}")]
    DeviceBusy(&'static str),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("aborted: {0}")]
    Abort(AbortReason),
}

impl SteerError {
    /// Rejected before any device I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SteerError::NotCalibrated
                | SteerError::AngleOutOfRange { .. }
                | SteerError::PositionOutOfRange { .. }
        )
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("following error {error} qc exceeds limit {limit} qc")]
    FollowingError { error: i64, limit: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T, E = Report> = eyre::Result<T, E>;
pub use eyre::Report;
