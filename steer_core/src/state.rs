//! CiA402 device states, status/control word bits and transition commands.
use bitflags::bitflags;

bitflags! {
    /// Status word (0x6041) bits as reported by EPOS drives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        const READY_TO_SWITCH_ON = 1 << 0;
        const SWITCHED_ON = 1 << 1;
        const OPERATION_ENABLED = 1 << 2;
        const FAULT = 1 << 3;
        const VOLTAGE_ENABLED = 1 << 4;
        const QUICK_STOP = 1 << 5;
        const SWITCH_ON_DISABLED = 1 << 6;
        const WARNING = 1 << 7;
        const OFFSET_CURRENT_MEASURED = 1 << 8;
        const REMOTE = 1 << 9;
        const TARGET_REACHED = 1 << 10;
        const INTERNAL_LIMIT_ACTIVE = 1 << 11;
        /// Set-point ack / speed / homing attained, depending on op mode.
        const OP_MODE_SPECIFIC_12 = 1 << 12;
        /// Following error / homing error, depending on op mode.
        const OP_MODE_SPECIFIC_13 = 1 << 13;
        const REFRESH_CYCLE = 1 << 14;
        const REFERENCED_TO_HOME = 1 << 15;
    }
}

bitflags! {
    /// Control word (0x6040) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlWord: u16 {
        const SWITCH_ON = 1 << 0;
        const ENABLE_VOLTAGE = 1 << 1;
        const QUICK_STOP = 1 << 2;
        const ENABLE_OPERATION = 1 << 3;
        /// New set-point / homing start, depending on op mode.
        const OP_MODE_SPECIFIC_4 = 1 << 4;
        /// Change set immediately.
        const OP_MODE_SPECIFIC_5 = 1 << 5;
        /// Absolute (0) / relative (1).
        const OP_MODE_SPECIFIC_6 = 1 << 6;
        const FAULT_RESET = 1 << 7;
        const HALT = 1 << 8;
    }
}

const STATUS_BIT_NAMES: [&str; 16] = [
    "ready to switch on",
    "switched on",
    "operation enable",
    "fault",
    "voltage enabled (power stage on)",
    "quick stop",
    "switch on disable",
    "warning",
    "offset current measured",
    "remote (NMT operational)",
    "target reached",
    "internal limit active",
    "op mode specific [set-point ack|speed|homing attained]",
    "op mode specific [following|homing error]",
    "refresh cycle of power stage",
    "position referenced to home",
];

const CONTROL_BIT_NAMES: [&str; 9] = [
    "switch on",
    "enable voltage",
    "quick stop",
    "enable operation",
    "op mode specific [new set-point|homing start]",
    "op mode specific [change set immediately]",
    "op mode specific [abs=0|rel=1]",
    "fault reset",
    "halt",
];

/// One line per bit, highest first, as `bit NN: name: 0|1`.
pub fn describe_status_word(raw: u16) -> Vec<String> {
    describe_bits(raw, &STATUS_BIT_NAMES)
}

pub fn describe_control_word(raw: u16) -> Vec<String> {
    describe_bits(raw, &CONTROL_BIT_NAMES)
}

fn describe_bits(raw: u16, names: &[&str]) -> Vec<String> {
    names
        .iter()
        .enumerate()
        .rev()
        .map(|(bit, name)| format!("bit {bit:02}: {name}: {}", (raw >> bit) & 1))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Start,
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    Refresh,
    MeasureInit,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActiveDisabled,
    FaultReactionActiveEnabled,
    Fault,
    Unknown,
}

impl DeviceState {
    pub fn is_fault(self) -> bool {
        matches!(
            self,
            DeviceState::Fault
                | DeviceState::FaultReactionActiveDisabled
                | DeviceState::FaultReactionActiveEnabled
        )
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceState::Start => "start",
            DeviceState::NotReadyToSwitchOn => "not ready to switch on",
            DeviceState::SwitchOnDisabled => "switch on disabled",
            DeviceState::ReadyToSwitchOn => "ready to switch on",
            DeviceState::SwitchedOn => "switched on",
            DeviceState::Refresh => "refresh",
            DeviceState::MeasureInit => "measure init",
            DeviceState::OperationEnabled => "operation enabled",
            DeviceState::QuickStopActive => "quick stop active",
            DeviceState::FaultReactionActiveDisabled => "fault reaction active (disabled)",
            DeviceState::FaultReactionActiveEnabled => "fault reaction active (enabled)",
            DeviceState::Fault => "fault",
            DeviceState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Mask applied to the status word before comparing against the state table.
pub const COMMON_MASK: u16 = 0b0100_0001_0111_1111;
/// Mask the legacy table uses for the SwitchedOn row only.
pub const SWITCHED_ON_MASK: u16 = 0b0000_0001_0111_1111;

/// Expected masked values in match priority order.
static STATE_ROWS: [(u16, DeviceState); 12] = [
    (0, DeviceState::Start),
    (256, DeviceState::NotReadyToSwitchOn),
    (320, DeviceState::SwitchOnDisabled),
    (289, DeviceState::ReadyToSwitchOn),
    (291, DeviceState::SwitchedOn),
    (16675, DeviceState::Refresh),
    (16691, DeviceState::MeasureInit),
    (311, DeviceState::OperationEnabled),
    (279, DeviceState::QuickStopActive),
    (271, DeviceState::FaultReactionActiveDisabled),
    (287, DeviceState::FaultReactionActiveEnabled),
    (264, DeviceState::Fault),
];

/// Status word classification table.
///
/// `Legacy` masks the SwitchedOn row with `SWITCHED_ON_MASK`, which ignores
/// bit 14; since that row is tried before Refresh, a Refresh status word
/// (16675) classifies as SwitchedOn. `Uniform` applies `COMMON_MASK` to every
/// row, making Refresh reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateTable {
    #[default]
    Legacy,
    Uniform,
}

impl StateTable {
    pub fn mask_for(self, state: DeviceState) -> u16 {
        match (self, state) {
            (StateTable::Legacy, DeviceState::SwitchedOn) => SWITCHED_ON_MASK,
            _ => COMMON_MASK,
        }
    }

    /// `(mask, expected, state)` rows in priority order.
    pub fn rows(self) -> impl Iterator<Item = (u16, u16, DeviceState)> {
        STATE_ROWS
            .iter()
            .map(move |&(value, state)| (self.mask_for(state), value, state))
    }

    pub fn classify(self, status_word: u16) -> DeviceState {
        self.rows()
            .find(|&(mask, value, _)| status_word & mask == value)
            .map_or(DeviceState::Unknown, |(_, _, state)| state)
    }
}

/// Transition requests. There is no separate "disable voltage"; shutdown
/// covers releasing torque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    Shutdown,
    SwitchOn,
    QuickStop,
    DisableOperation,
    EnableOperation,
    FaultReset,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 6] = [
        ControlCommand::Shutdown,
        ControlCommand::SwitchOn,
        ControlCommand::QuickStop,
        ControlCommand::DisableOperation,
        ControlCommand::EnableOperation,
        ControlCommand::FaultReset,
    ];

    /// Bits cleared from the previous control word.
    pub fn clear_bits(self) -> ControlWord {
        match self {
            ControlCommand::Shutdown => ControlWord::FAULT_RESET | ControlWord::SWITCH_ON,
            ControlCommand::SwitchOn | ControlCommand::EnableOperation => ControlWord::FAULT_RESET,
            ControlCommand::QuickStop => ControlWord::FAULT_RESET | ControlWord::QUICK_STOP,
            ControlCommand::DisableOperation => {
                ControlWord::FAULT_RESET | ControlWord::ENABLE_OPERATION
            }
            ControlCommand::FaultReset => ControlWord::empty(),
        }
    }

    /// Bits set after clearing.
    pub fn set_bits(self) -> ControlWord {
        let on = ControlWord::QUICK_STOP | ControlWord::ENABLE_VOLTAGE | ControlWord::SWITCH_ON;
        match self {
            ControlCommand::Shutdown => ControlWord::QUICK_STOP | ControlWord::ENABLE_VOLTAGE,
            ControlCommand::SwitchOn | ControlCommand::DisableOperation => on,
            ControlCommand::QuickStop => ControlWord::ENABLE_VOLTAGE,
            ControlCommand::EnableOperation => on | ControlWord::ENABLE_OPERATION,
            ControlCommand::FaultReset => ControlWord::FAULT_RESET,
        }
    }

    /// Read-modify-write step: `(old & !clear) | set`. Bits outside the
    /// command's masks are preserved.
    #[inline]
    pub fn apply(self, old: u16) -> u16 {
        (old & !self.clear_bits().bits()) | self.set_bits().bits()
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControlCommand::Shutdown => "shutdown",
            ControlCommand::SwitchOn => "switch on",
            ControlCommand::QuickStop => "quick stop",
            ControlCommand::DisableOperation => "disable operation",
            ControlCommand::EnableOperation => "enable operation",
            ControlCommand::FaultReset => "fault reset",
        };
        f.write_str(s)
    }
}
