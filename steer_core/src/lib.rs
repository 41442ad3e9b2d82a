#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Motion-control core for a steering-wheel drive (hardware-agnostic).
//!
//! All drive access goes through `steer_traits::ObjectChannel`.
//!
//! ## Architecture
//!
//! - **State machine**: status word classification and control word commands (`state`)
//! - **Device**: typed register access over the channel (`device`)
//! - **Calibration**: worker-thread range discovery and angle conversion (`calibration`)
//! - **Profile**: jerk-limited reference trajectory (`profile`)
//! - **Tracker**: closed loop with the following-error cutoff (`tracker`)
//! - **Controller**: single owner of the drive sequencing the above (`controller`)
//!
//! Positions are `i32` quadrature counts (qc); angles are degrees.

pub mod calibration;
pub mod controller;
pub mod conversions;
pub mod device;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod profile;
pub mod state;
pub mod tracker;
pub mod util;

pub use calibration::{AngleScale, Calibration, CalibrationCfg, CalibrationRange, CalibrationRun};
pub use controller::{CalibrationSummary, ControllerBuilder, SteeringController, Target};
pub use device::{Device, OpMode};
pub use error::{AbortReason, BuildError, Report, Result, SteerError};
pub use profile::{MotionLimits, MotionProfile};
pub use state::{ControlCommand, ControlWord, DeviceState, StateTable, StatusWord};
pub use tracker::{MotionOutcome, MotionReport, TrackingCfg, TrackingSample};
