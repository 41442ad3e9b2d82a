//! Travel-range discovery and angle/position conversion.
//!
//! A `CalibrationRun` moves the `Device` onto a worker thread that samples
//! the actual position until stopped, tracking the extremes the operator
//! turns the wheel to. `finish` stops the worker, joins it and hands the
//! device back together with the tally.
use crate::device::Device;
use crate::error::SteerError;
use crate::state::{ControlCommand, DeviceState};
use crate::util::round_to_i32;
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use steer_traits::{Clock, ObjectChannel};

/// Linear steering-angle scale around the zero reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleScale {
    /// Degrees per quadrature count.
    pub qc_to_delta: f64,
    /// Symmetric angle limit in degrees.
    pub max_angle: f64,
}

impl Default for AngleScale {
    fn default() -> Self {
        Self {
            qc_to_delta: -7.501e-4,
            max_angle: 29.0,
        }
    }
}

impl AngleScale {
    #[inline]
    pub fn delta_to_qc(&self) -> f64 {
        1.0 / self.qc_to_delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationCfg {
    pub sample_period: Duration,
    pub scale: AngleScale,
    /// Bound on waiting for the worker's result once stop is requested.
    pub result_timeout: Duration,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(10),
            scale: AngleScale::default(),
            result_timeout: Duration::from_secs(30),
        }
    }
}

/// Extremes observed so far. Both start at 0, so the range always covers
/// the zero count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationRange {
    pub min: i32,
    pub max: i32,
}

impl CalibrationRange {
    pub fn observe(&mut self, qc: i32) {
        self.min = self.min.min(qc);
        self.max = self.max.max(qc);
    }

    /// Midpoint rounded to the nearest count.
    pub fn zero_reference(&self) -> i32 {
        let (min, max) = (f64::from(self.min), f64::from(self.max));
        round_to_i32((max - min) / 2.0 + min)
    }
}

/// What the sampling worker saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationTally {
    pub range: CalibrationRange,
    pub samples: u64,
    /// Failed position reads; informational only.
    pub failures: u64,
}

impl CalibrationTally {
    pub fn record(&mut self, qc: i32) {
        self.samples += 1;
        self.range.observe(qc);
    }

    /// Read failures never fail a run; a run without samples yields `[0, 0]`.
    pub fn into_calibration(self, scale: AngleScale) -> Calibration {
        Calibration::from_range(self.range, scale)
    }
}

/// Result of a completed calibration run. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub min_value: i32,
    pub max_value: i32,
    pub zero_reference: i32,
    pub scale: AngleScale,
}

impl Calibration {
    pub fn from_range(range: CalibrationRange, scale: AngleScale) -> Self {
        Self {
            min_value: range.min,
            max_value: range.max,
            zero_reference: range.zero_reference(),
            scale,
        }
    }

    pub fn position_for_angle(&self, angle: f64) -> Result<i32, SteerError> {
        let max = self.scale.max_angle;
        if !angle.is_finite() || angle.abs() > max {
            return Err(SteerError::AngleOutOfRange { angle, max });
        }
        Ok(round_to_i32(
            angle * self.scale.delta_to_qc() + f64::from(self.zero_reference),
        ))
    }

    pub fn angle_for_position(&self, qc: i32) -> f64 {
        (f64::from(qc) - f64::from(self.zero_reference)) * self.scale.qc_to_delta
    }

    pub fn contains(&self, qc: i32) -> bool {
        (self.min_value..=self.max_value).contains(&qc)
    }

    pub fn check_position(&self, qc: i32) -> Result<(), SteerError> {
        if self.contains(qc) {
            Ok(())
        } else {
            Err(SteerError::PositionOutOfRange {
                position: qc,
                min: self.min_value,
                max: self.max_value,
            })
        }
    }
}

/// Make sure the motor does not oppose the operator turning the wheel.
///
/// Issues `shutdown` when the drive reports operation enabled, or when its
/// state cannot be read at all.
pub fn release_torque<C: ObjectChannel>(device: &mut Device<C>) -> Result<(), SteerError> {
    match device.read_state() {
        Ok(DeviceState::OperationEnabled) => {
            tracing::info!("drive enabled, shutting down before calibration");
            device.change_state(ControlCommand::Shutdown)
        }
        Ok(state) => {
            tracing::debug!(%state, "drive free to turn");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(error = %e, "state unreadable, shutting down before calibration");
            device.change_state(ControlCommand::Shutdown)
        }
    }
}

type WorkerOutput<C> = (Device<C>, CalibrationTally);

/// One in-flight sampling worker. Dropping it stops and joins the worker.
pub struct CalibrationRun<C> {
    rx: xch::Receiver<WorkerOutput<C>>,
    stop: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
    result_timeout: Duration,
}

impl<C: ObjectChannel + Send + 'static> CalibrationRun<C> {
    pub fn spawn<K: Clock + Send + 'static>(
        mut device: Device<C>,
        cfg: CalibrationCfg,
        clock: K,
    ) -> Self {
        let (tx, rx) = xch::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let period = cfg.sample_period;

        let join_handle = std::thread::spawn(move || {
            let mut tally = CalibrationTally::default();
            // At least one sample is taken even if stop is already requested.
            loop {
                match device.read_position() {
                    Ok(qc) => {
                        tally.record(qc);
                        tracing::trace!(qc, "calibration sample");
                    }
                    Err(e) => {
                        tally.failures += 1;
                        tracing::debug!(error = %e, failures = tally.failures, "calibration read failed");
                    }
                }
                if stop_clone.load(Ordering::Acquire) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::debug!(
                samples = tally.samples,
                failures = tally.failures,
                "calibration worker stopping"
            );
            if tx.send((device, tally)).is_err() {
                tracing::debug!("calibration result receiver gone");
            }
        });

        Self {
            rx,
            stop,
            join_handle: Some(join_handle),
            result_timeout: cfg.result_timeout,
        }
    }

    /// Signal stop, wait for the result (bounded) and join the worker.
    pub fn finish(mut self) -> Result<(Device<C>, CalibrationTally), SteerError> {
        self.stop.store(true, Ordering::Release);
        match self.rx.recv_timeout(self.result_timeout) {
            Ok(out) => {
                self.join();
                Ok(out)
            }
            Err(xch::RecvTimeoutError::Timeout) => {
                // The worker is stuck in a channel call; leave it detached.
                self.join_handle.take();
                tracing::error!(timeout = ?self.result_timeout, "calibration worker did not report");
                Err(SteerError::CalibrationTimeout(self.result_timeout))
            }
            Err(xch::RecvTimeoutError::Disconnected) => {
                self.join();
                Err(SteerError::CalibrationWorker)
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "calibration worker panicked");
        }
    }
}

impl<C> Drop for CalibrationRun<C> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("calibration worker joined"),
                Err(e) => tracing::warn!(?e, "calibration worker panicked during shutdown"),
            }
        }
    }
}
