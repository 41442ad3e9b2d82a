use proptest::prelude::*;
use rstest::rstest;
use steer_core::mocks::MemoryChannel;
use steer_core::state::{COMMON_MASK, SWITCHED_ON_MASK};
use steer_core::{ControlCommand, Device, DeviceState, SteerError, StateTable};

#[rstest]
#[case(0, DeviceState::Start)]
#[case(256, DeviceState::NotReadyToSwitchOn)]
#[case(320, DeviceState::SwitchOnDisabled)]
#[case(289, DeviceState::ReadyToSwitchOn)]
#[case(291, DeviceState::SwitchedOn)]
#[case(16691, DeviceState::MeasureInit)]
#[case(311, DeviceState::OperationEnabled)]
#[case(279, DeviceState::QuickStopActive)]
#[case(271, DeviceState::FaultReactionActiveDisabled)]
#[case(287, DeviceState::FaultReactionActiveEnabled)]
#[case(264, DeviceState::Fault)]
fn documented_values_classify_under_both_tables(
    #[case] status: u16,
    #[case] expected: DeviceState,
    #[values(StateTable::Legacy, StateTable::Uniform)] table: StateTable,
) {
    assert_eq!(table.classify(status), expected);
}

#[test]
fn refresh_is_shadowed_by_switched_on_in_legacy_table() {
    // 16675 & SWITCHED_ON_MASK == 291, and SwitchedOn is tried first.
    assert_eq!(16675 & SWITCHED_ON_MASK, 291);
    assert_eq!(StateTable::Legacy.classify(16675), DeviceState::SwitchedOn);
    assert_eq!(StateTable::Uniform.classify(16675), DeviceState::Refresh);
}

#[rstest]
#[case(0x0337, DeviceState::OperationEnabled)] // remote bit set
#[case(0x8140, DeviceState::SwitchOnDisabled)] // referenced-to-home bit set
#[case(0x05A3, DeviceState::SwitchedOn)] // warning + target reached
#[case(0x2308, DeviceState::Fault)]
fn bits_outside_mask_are_ignored(#[case] status: u16, #[case] expected: DeviceState) {
    assert_eq!(StateTable::Legacy.classify(status), expected);
}

#[rstest]
#[case(1)]
#[case(0x0102)]
#[case(0x0140 | 0x0001)]
#[case(0x4000)]
#[case(0x00FF)]
fn unmatched_values_are_unknown(#[case] status: u16) {
    assert_eq!(StateTable::Legacy.classify(status), DeviceState::Unknown);
    assert_eq!(StateTable::Uniform.classify(status), DeviceState::Unknown);
}

const DOCUMENTED: [u16; 12] = [
    0, 256, 320, 289, 291, 16675, 16691, 311, 279, 271, 287, 264,
];

proptest! {
    #[test]
    fn uniform_table_is_a_pure_function_of_masked_value(status in any::<u16>()) {
        let masked = status & COMMON_MASK;
        let state = StateTable::Uniform.classify(status);
        prop_assert_eq!(state, StateTable::Uniform.classify(masked));
        prop_assert_eq!(state == DeviceState::Unknown, !DOCUMENTED.contains(&masked));
    }

    #[test]
    fn legacy_differs_from_uniform_only_on_refresh(status in any::<u16>()) {
        let legacy = StateTable::Legacy.classify(status);
        let uniform = StateTable::Uniform.classify(status);
        if legacy != uniform {
            prop_assert_eq!(legacy, DeviceState::SwitchedOn);
            prop_assert_eq!(status & SWITCHED_ON_MASK, 291);
        }
    }
}

#[rstest]
#[case(ControlCommand::Shutdown, 0b1000_0001, 0b0110)]
#[case(ControlCommand::SwitchOn, 0b1000_0000, 0b0111)]
#[case(ControlCommand::QuickStop, 0b1000_0100, 0b0010)]
#[case(ControlCommand::DisableOperation, 0b1000_1000, 0b0111)]
#[case(ControlCommand::EnableOperation, 0b1000_0000, 0b1111)]
#[case(ControlCommand::FaultReset, 0, 0b1000_0000)]
fn command_masks(#[case] cmd: ControlCommand, #[case] clear: u16, #[case] set: u16) {
    assert_eq!(cmd.clear_bits().bits(), clear);
    assert_eq!(cmd.set_bits().bits(), set);
}

proptest! {
    #[test]
    fn change_state_is_read_modify_write(old in any::<u16>(), idx in 0usize..6) {
        let cmd = ControlCommand::ALL[idx];
        let ch = MemoryChannel::new();
        ch.set_control_word(old);
        let mut dev = Device::new(ch.clone());
        dev.change_state(cmd).unwrap();
        let expected = (old & !cmd.clear_bits().bits()) | cmd.set_bits().bits();
        prop_assert_eq!(ch.control_words_written(), vec![expected]);
    }
}

#[test]
fn upper_bits_survive_transitions() {
    let ch = MemoryChannel::new();
    ch.set_control_word(0x0100); // halt
    let mut dev = Device::new(ch.clone());
    dev.change_state(ControlCommand::Shutdown).unwrap();
    dev.change_state(ControlCommand::SwitchOn).unwrap();
    dev.change_state(ControlCommand::EnableOperation).unwrap();
    assert_eq!(ch.control_words_written(), vec![0x0106, 0x0107, 0x010F]);
}

#[test]
fn control_word_read_failure_skips_write() {
    let ch = MemoryChannel::new();
    ch.fail_reads(0x6040, 0, 1);
    let mut dev = Device::new(ch.clone());
    let err = dev.change_state(ControlCommand::EnableOperation).unwrap_err();
    assert!(matches!(
        err,
        SteerError::StateTransition {
            command: ControlCommand::EnableOperation,
            ..
        }
    ));
    assert!(ch.writes().is_empty());
}

#[test]
fn control_word_write_failure_is_transition_error() {
    let ch = MemoryChannel::new();
    ch.fail_writes(0x6040, 0, 1);
    let mut dev = Device::new(ch);
    let err = dev.change_state(ControlCommand::Shutdown).unwrap_err();
    assert!(err.to_string().contains("'shutdown' failed"));
}

#[test]
fn read_state_uses_fresh_read_and_configured_table() {
    let ch = MemoryChannel::new();
    let mut dev = Device::new(ch.clone()).with_state_table(StateTable::Uniform);
    ch.set_status_word(16675);
    assert_eq!(dev.read_state().unwrap(), DeviceState::Refresh);
    ch.set_status_word(0x0108);
    assert_eq!(dev.read_state().unwrap(), DeviceState::Fault);
    assert_eq!(ch.read_count(0x6041, 0), 2);
}

#[test]
fn read_state_failure_is_an_error_not_a_state() {
    let ch = MemoryChannel::new();
    ch.fail_reads(0x6041, 0, 1);
    let mut dev = Device::new(ch);
    assert!(dev.read_state().is_err());
    assert_eq!(dev.read_state().unwrap(), DeviceState::SwitchOnDisabled);
}

#[test]
fn emcy_listener_is_registered() {
    let ch = MemoryChannel::new();
    let mut dev = Device::new(ch.clone());
    assert!(!ch.emit_emcy(steer_traits::EmcyMessage {
        code: 0x8611,
        register: 1,
        data: [0; 5]
    }));
    dev.watch_emcy();
    assert!(ch.emit_emcy(steer_traits::EmcyMessage {
        code: 0x8611,
        register: 1,
        data: [0; 5]
    }));
}
