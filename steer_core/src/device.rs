//! Typed register access to one drive node.
//!
//! `Device` owns the `ObjectChannel` and converts little-endian payloads to
//! typed values. State is never cached: every query is a fresh read.
use crate::error::SteerError;
use crate::hw_error::map_hw_error;
use crate::state::{ControlCommand, DeviceState, StateTable};
use steer_traits::{EmcyMessage, ObjectAddr, ObjectChannel, RegisterMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpMode {
    Homing,
    ProfileVelocity,
    ProfilePosition,
    Position,
    Velocity,
    Current,
    Diagnostic,
    MasterEncoder,
    StepDirection,
}

impl OpMode {
    pub fn code(self) -> i8 {
        match self {
            OpMode::Homing => 6,
            OpMode::ProfileVelocity => 3,
            OpMode::ProfilePosition => 1,
            OpMode::Position => -1,
            OpMode::Velocity => -2,
            OpMode::Current => -3,
            OpMode::Diagnostic => -4,
            OpMode::MasterEncoder => -5,
            OpMode::StepDirection => -6,
        }
    }
}

impl TryFrom<i8> for OpMode {
    type Error = SteerError;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        Ok(match code {
            6 => OpMode::Homing,
            3 => OpMode::ProfileVelocity,
            1 => OpMode::ProfilePosition,
            -1 => OpMode::Position,
            -2 => OpMode::Velocity,
            -3 => OpMode::Current,
            -4 => OpMode::Diagnostic,
            -5 => OpMode::MasterEncoder,
            -6 => OpMode::StepDirection,
            other => return Err(SteerError::UnknownOpMode(other)),
        })
    }
}

impl std::fmt::Display for OpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpMode::Homing => "homing",
            OpMode::ProfileVelocity => "profile velocity",
            OpMode::ProfilePosition => "profile position",
            OpMode::Position => "position",
            OpMode::Velocity => "velocity",
            OpMode::Current => "current",
            OpMode::Diagnostic => "diagnostic",
            OpMode::MasterEncoder => "master encoder",
            OpMode::StepDirection => "step/direction",
        };
        f.write_str(s)
    }
}

pub struct Device<C> {
    channel: C,
    map: RegisterMap,
    table: StateTable,
}

impl<C: ObjectChannel> Device<C> {
    pub fn new(channel: C) -> Self {
        let map = channel.register_map();
        Self {
            channel,
            map,
            table: StateTable::default(),
        }
    }
}

impl<C> Device<C> {
    pub fn with_state_table(mut self, table: StateTable) -> Self {
        self.table = table;
        self
    }

    pub fn state_table(&self) -> StateTable {
        self.table
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }
}

impl<C: ObjectChannel> Device<C> {
    /// Log EMCY frames pushed by the drive. No other reaction is taken.
    pub fn watch_emcy(&mut self) {
        self.channel.on_emcy(Box::new(|msg: EmcyMessage| {
            tracing::warn!(
                code = format_args!("0x{:04X}", msg.code),
                register = msg.register,
                data = ?msg.data,
                "EMCY received"
            );
        }));
    }

    fn read_bytes<const N: usize>(&mut self, addr: ObjectAddr) -> Result<[u8; N], SteerError> {
        let raw = self
            .channel
            .read(addr.index, addr.subindex)
            .map_err(|e| map_hw_error(&*e))?;
        raw.as_slice().try_into().map_err(|_| SteerError::Payload {
            object: addr.to_string(),
            expected: N,
            got: raw.len(),
        })
    }

    fn write_bytes(&mut self, addr: ObjectAddr, data: &[u8]) -> Result<(), SteerError> {
        self.channel
            .write(addr.index, addr.subindex, data)
            .map_err(|e| map_hw_error(&*e))
    }

    pub fn read_status_word(&mut self) -> Result<u16, SteerError> {
        self.read_bytes(self.map.status_word).map(u16::from_le_bytes)
    }

    pub fn read_control_word(&mut self) -> Result<u16, SteerError> {
        self.read_bytes(self.map.control_word).map(u16::from_le_bytes)
    }

    pub fn write_control_word(&mut self, cw: u16) -> Result<(), SteerError> {
        self.write_bytes(self.map.control_word, &cw.to_le_bytes())
    }

    /// Classify a fresh status word read. No retry on failure.
    pub fn read_state(&mut self) -> Result<DeviceState, SteerError> {
        let sw = self.read_status_word()?;
        let state = self.table.classify(sw);
        tracing::trace!(status_word = format_args!("0x{sw:04X}"), %state, "device state");
        Ok(state)
    }

    /// Read the control word, apply the command masks and write it back.
    ///
    /// The resulting state is not verified; re-read it if confirmation is needed.
    pub fn change_state(&mut self, command: ControlCommand) -> Result<(), SteerError> {
        let fail = |e: SteerError| SteerError::StateTransition {
            command,
            reason: e.to_string(),
        };
        let old = self.read_control_word().map_err(fail)?;
        let new = command.apply(old);
        self.write_control_word(new).map_err(fail)?;
        tracing::debug!(
            %command,
            old = format_args!("0x{old:04X}"),
            new = format_args!("0x{new:04X}"),
            "control word written"
        );
        Ok(())
    }

    pub fn read_position(&mut self) -> Result<i32, SteerError> {
        self.read_bytes(self.map.position_actual).map(i32::from_le_bytes)
    }

    pub fn read_position_setting(&mut self) -> Result<i32, SteerError> {
        self.read_bytes(self.map.position_setting).map(i32::from_le_bytes)
    }

    /// Demanded position in position mode.
    pub fn write_position_setting(&mut self, qc: i32) -> Result<(), SteerError> {
        self.write_bytes(self.map.position_setting, &qc.to_le_bytes())
    }

    pub fn read_op_mode(&mut self) -> Result<OpMode, SteerError> {
        let [code] = self.read_bytes::<1>(self.map.op_mode)?;
        OpMode::try_from(code as i8)
    }

    pub fn read_op_mode_display(&mut self) -> Result<OpMode, SteerError> {
        let [code] = self.read_bytes::<1>(self.map.op_mode_display)?;
        OpMode::try_from(code as i8)
    }

    pub fn set_op_mode(&mut self, mode: OpMode) -> Result<(), SteerError> {
        self.write_bytes(self.map.op_mode, &mode.code().to_le_bytes())
    }

    pub fn read_max_following_error(&mut self) -> Result<u32, SteerError> {
        self.read_bytes(self.map.max_following_error).map(u32::from_le_bytes)
    }

    pub fn write_max_following_error(&mut self, qc: u32) -> Result<(), SteerError> {
        self.write_bytes(self.map.max_following_error, &qc.to_le_bytes())
    }

    /// Drive-side following error actual value.
    pub fn read_following_error(&mut self) -> Result<i16, SteerError> {
        self.read_bytes(self.map.following_error).map(i16::from_le_bytes)
    }

    pub fn read_software_limits(&mut self) -> Result<(i32, i32), SteerError> {
        let min = self.read_bytes(self.map.software_limit_min).map(i32::from_le_bytes)?;
        let max = self.read_bytes(self.map.software_limit_max).map(i32::from_le_bytes)?;
        Ok((min, max))
    }

    /// Min is written first, then max.
    pub fn write_software_limits(&mut self, min: i32, max: i32) -> Result<(), SteerError> {
        self.write_bytes(self.map.software_limit_min, &min.to_le_bytes())?;
        self.write_bytes(self.map.software_limit_max, &max.to_le_bytes())
    }

    pub fn store_parameters(&mut self) -> Result<(), SteerError> {
        self.channel
            .store_parameters()
            .map_err(|e| map_hw_error(&*e))
    }

    pub fn restore_defaults(&mut self) -> Result<(), SteerError> {
        self.channel
            .restore_defaults()
            .map_err(|e| map_hw_error(&*e))
    }
}
