//! In-process stand-in for an EPOS drive on the bus.
//!
//! Implements the CiA402 power state machine, a first-order position loop in
//! position mode, an operator who swings the wheel while the motor is off,
//! EMCY on faults and SDO abort codes for bad accesses. All state lives behind
//! a shared handle so tests can inject faults while the core owns the channel.
use crate::error::{
    ABORT_LENGTH_MISMATCH, ABORT_MAX_BELOW_MIN, ABORT_NO_OBJECT, ABORT_VALUE_RANGE,
    ABORT_WRITE_READ_ONLY, HwError,
};
use std::sync::{Arc, Mutex, MutexGuard};
use steer_traits::registers::{RESTORE_SIGNATURE, STORE_SIGNATURE};
use steer_traits::{BoxError, EmcyCallback, EmcyMessage, ObjectAddr, ObjectChannel, RegisterMap};

/// EMCY code raised when the drive's own following error check trips.
pub const EMCY_FOLLOWING_ERROR: u16 = 0x8611;

// Bit 9 (remote) is always reported; classification must mask it out.
const REMOTE: u16 = 1 << 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    Fault,
}

impl PowerState {
    fn status_bits(self) -> u16 {
        match self {
            PowerState::SwitchOnDisabled => 0x0140,
            PowerState::ReadyToSwitchOn => 0x0121,
            PowerState::SwitchedOn => 0x0123,
            PowerState::OperationEnabled => 0x0137,
            PowerState::QuickStopActive => 0x0117,
            PowerState::Fault => 0x0108,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sweep {
    min: i32,
    max: i32,
    step: i32,
}

struct Model {
    node_id: u8,
    state: PowerState,
    control_word: u16,
    actual: i32,
    setpoint: i32,
    op_mode: i8,
    max_following_error: u32,
    limit_min: i32,
    limit_max: i32,
    /// Fraction of the remaining error closed per position read.
    lag: f64,
    sweep: Option<Sweep>,
    sweep_dir: i32,
    fail_reads: u32,
    fail_writes: u32,
    position_reads: u64,
    stored: u32,
    restored: u32,
    emcy: Option<EmcyCallback>,
}

impl Model {
    fn following_error(&self) -> i32 {
        self.setpoint.saturating_sub(self.actual)
    }

    fn raise_fault(&mut self, code: u16) {
        tracing::debug!(node = self.node_id, code, "sim drive fault");
        self.state = PowerState::Fault;
        if let Some(cb) = self.emcy.as_mut() {
            cb(EmcyMessage {
                code,
                register: 0x01,
                data: [0; 5],
            });
        }
    }

    fn apply_control(&mut self, cw: u16) {
        let rising_reset = cw & 0x80 != 0 && self.control_word & 0x80 == 0;
        self.control_word = cw;
        let next = match self.state {
            PowerState::Fault if rising_reset => Some(PowerState::SwitchOnDisabled),
            PowerState::Fault => None,
            s if cw & 0x82 == 0x00 => (s != PowerState::SwitchOnDisabled)
                .then_some(PowerState::SwitchOnDisabled),
            PowerState::OperationEnabled if cw & 0x86 == 0x02 => Some(PowerState::QuickStopActive),
            PowerState::ReadyToSwitchOn | PowerState::SwitchedOn if cw & 0x86 == 0x02 => {
                Some(PowerState::SwitchOnDisabled)
            }
            PowerState::SwitchOnDisabled
            | PowerState::SwitchedOn
            | PowerState::OperationEnabled
                if cw & 0x87 == 0x06 =>
            {
                Some(PowerState::ReadyToSwitchOn)
            }
            PowerState::ReadyToSwitchOn | PowerState::OperationEnabled if cw & 0x8F == 0x07 => {
                Some(PowerState::SwitchedOn)
            }
            // From ready to switch on, 0x0F runs switch on and enable in one go.
            PowerState::ReadyToSwitchOn
            | PowerState::SwitchedOn
            | PowerState::QuickStopActive
                if cw & 0x8F == 0x0F =>
            {
                Some(PowerState::OperationEnabled)
            }
            _ => None,
        };
        if let Some(next) = next {
            tracing::trace!(node = self.node_id, from = ?self.state, to = ?next, "sim transition");
            if next == PowerState::OperationEnabled {
                // Hold the current position on enable.
                self.setpoint = self.actual;
            }
            self.state = next;
        }
    }

    fn step_position(&mut self) {
        match self.state {
            PowerState::OperationEnabled if self.op_mode == -1 => {
                let err = f64::from(self.following_error());
                self.actual += (err * self.lag).round() as i32;
                let fe = self.following_error().unsigned_abs();
                if self.max_following_error > 0 && fe > self.max_following_error {
                    self.raise_fault(EMCY_FOLLOWING_ERROR);
                }
            }
            PowerState::OperationEnabled => {}
            _ => {
                if let Some(s) = self.sweep {
                    let next = self.actual + self.sweep_dir * s.step;
                    if next >= s.max {
                        self.actual = s.max;
                        self.sweep_dir = -1;
                    } else if next <= s.min {
                        self.actual = s.min;
                        self.sweep_dir = 1;
                    } else {
                        self.actual = next;
                    }
                }
            }
        }
    }
}

/// Simulated drive node. Clones share the same drive.
#[derive(Clone)]
pub struct SimulatedDrive {
    model: Arc<Mutex<Model>>,
    map: RegisterMap,
}

impl Default for SimulatedDrive {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SimulatedDrive {
    pub fn new(node_id: u8) -> Self {
        let model = Model {
            node_id,
            state: PowerState::SwitchOnDisabled,
            control_word: 0,
            actual: 0,
            setpoint: 0,
            op_mode: 1,
            max_following_error: 0,
            limit_min: i32::MIN,
            limit_max: i32::MAX,
            lag: 0.5,
            sweep: None,
            sweep_dir: 1,
            fail_reads: 0,
            fail_writes: 0,
            position_reads: 0,
            stored: 0,
            restored: 0,
            emcy: None,
        };
        Self {
            model: Arc::new(Mutex::new(model)),
            map: RegisterMap::default(),
        }
    }

    /// While the motor is not enabled, every position read moves the wheel
    /// by `step` between `min` and `max`, like an operator turning it.
    pub fn with_operator_sweep(self, min: i32, max: i32, step: i32) -> Self {
        {
            let mut m = self.lock();
            m.sweep = Some(Sweep {
                min,
                max,
                step: step.max(1),
            });
        }
        self
    }

    pub fn with_position(self, qc: i32) -> Self {
        self.lock().actual = qc;
        self
    }

    /// Fraction of the following error closed per position read, clamped to (0, 1].
    pub fn with_lag(self, lag: f64) -> Self {
        self.lock().lag = if lag.is_finite() { lag.clamp(0.01, 1.0) } else { 1.0 };
        self
    }

    fn lock(&self) -> MutexGuard<'_, Model> {
        self.model.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> PowerState {
        self.lock().state
    }

    pub fn position(&self) -> i32 {
        self.lock().actual
    }

    pub fn setpoint(&self) -> i32 {
        self.lock().setpoint
    }

    pub fn op_mode(&self) -> i8 {
        self.lock().op_mode
    }

    pub fn software_limits(&self) -> (i32, i32) {
        let m = self.lock();
        (m.limit_min, m.limit_max)
    }

    pub fn max_following_error(&self) -> u32 {
        self.lock().max_following_error
    }

    /// Successful position actual reads so far.
    pub fn position_reads(&self) -> u64 {
        self.lock().position_reads
    }

    /// Number of successful store / restore requests.
    pub fn persist_counts(&self) -> (u32, u32) {
        let m = self.lock();
        (m.stored, m.restored)
    }

    /// Drive a fault from outside, as an overcurrent or overtemperature would.
    pub fn inject_fault(&self, code: u16) {
        self.lock().raise_fault(code);
    }

    pub fn fail_next_reads(&self, n: u32) {
        self.lock().fail_reads = n;
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.lock().fail_writes = n;
    }

    fn read_object(&self, addr: ObjectAddr) -> Result<Vec<u8>, HwError> {
        let map = self.map;
        let mut m = self.lock();
        if m.fail_reads > 0 {
            m.fail_reads -= 1;
            return Err(HwError::Timeout);
        }
        let bytes = if addr == map.status_word {
            (m.state.status_bits() | REMOTE).to_le_bytes().to_vec()
        } else if addr == map.control_word {
            m.control_word.to_le_bytes().to_vec()
        } else if addr == map.position_actual {
            m.position_reads += 1;
            m.step_position();
            m.actual.to_le_bytes().to_vec()
        } else if addr == map.position_setting {
            m.setpoint.to_le_bytes().to_vec()
        } else if addr == map.op_mode || addr == map.op_mode_display {
            m.op_mode.to_le_bytes().to_vec()
        } else if addr == map.max_following_error {
            m.max_following_error.to_le_bytes().to_vec()
        } else if addr == map.following_error {
            let fe = m.following_error().clamp(i32::from(i16::MIN), i32::from(i16::MAX));
            (fe as i16).to_le_bytes().to_vec()
        } else if addr == map.software_limit_min {
            m.limit_min.to_le_bytes().to_vec()
        } else if addr == map.software_limit_max {
            m.limit_max.to_le_bytes().to_vec()
        } else {
            return Err(HwError::sdo_abort(ABORT_NO_OBJECT));
        };
        Ok(bytes)
    }

    fn write_object(&self, addr: ObjectAddr, data: &[u8]) -> Result<(), HwError> {
        let map = self.map;
        let mut m = self.lock();
        if m.fail_writes > 0 {
            m.fail_writes -= 1;
            return Err(HwError::Timeout);
        }
        if addr == map.status_word || addr == map.position_actual || addr == map.following_error {
            return Err(HwError::sdo_abort(ABORT_WRITE_READ_ONLY));
        }
        if addr == map.control_word {
            let cw = u16::from_le_bytes(fixed(data)?);
            m.apply_control(cw);
        } else if addr == map.position_setting {
            m.setpoint = i32::from_le_bytes(fixed(data)?);
        } else if addr == map.op_mode {
            let [mode] = fixed::<1>(data)?;
            let mode = mode as i8;
            if !(-6..=6).contains(&mode) || mode == 0 || mode == 2 || mode == 4 || mode == 5 {
                return Err(HwError::sdo_abort(ABORT_VALUE_RANGE));
            }
            m.op_mode = mode;
        } else if addr == map.max_following_error {
            m.max_following_error = u32::from_le_bytes(fixed(data)?);
        } else if addr == map.software_limit_min {
            let v = i32::from_le_bytes(fixed(data)?);
            if v > m.limit_max {
                return Err(HwError::sdo_abort(ABORT_MAX_BELOW_MIN));
            }
            m.limit_min = v;
        } else if addr == map.software_limit_max {
            let v = i32::from_le_bytes(fixed(data)?);
            if v < m.limit_min {
                return Err(HwError::sdo_abort(ABORT_MAX_BELOW_MIN));
            }
            m.limit_max = v;
        } else if addr == map.store_parameters {
            if u32::from_le_bytes(fixed(data)?) != STORE_SIGNATURE {
                return Err(HwError::sdo_abort(ABORT_VALUE_RANGE));
            }
            m.stored += 1;
        } else if addr == map.restore_defaults {
            if u32::from_le_bytes(fixed(data)?) != RESTORE_SIGNATURE {
                return Err(HwError::sdo_abort(ABORT_VALUE_RANGE));
            }
            m.restored += 1;
            m.max_following_error = 0;
            m.limit_min = i32::MIN;
            m.limit_max = i32::MAX;
        } else {
            return Err(HwError::sdo_abort(ABORT_NO_OBJECT));
        }
        Ok(())
    }
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N], HwError> {
    data.try_into()
        .map_err(|_| HwError::sdo_abort(ABORT_LENGTH_MISMATCH))
}

impl ObjectChannel for SimulatedDrive {
    fn read(&mut self, index: u16, subindex: u8) -> Result<Vec<u8>, BoxError> {
        Ok(self.read_object(ObjectAddr::new(index, subindex))?)
    }

    fn write(&mut self, index: u16, subindex: u8, data: &[u8]) -> Result<(), BoxError> {
        Ok(self.write_object(ObjectAddr::new(index, subindex), data)?)
    }

    fn register_map(&self) -> RegisterMap {
        self.map
    }

    fn on_emcy(&mut self, callback: EmcyCallback) {
        self.lock().emcy = Some(callback);
    }
}
