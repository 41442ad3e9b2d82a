use std::time::{Duration, Instant};
use steer_core::mocks::MemoryChannel;
use steer_core::{
    AbortReason, ControlCommand, Device, MotionLimits, MotionOutcome, MotionProfile,
    SteerError, SteeringController, Target, TrackingCfg,
};
use steer_hardware::{PowerState, SimulatedDrive};
use steer_traits::{Clock, ManualClock, ObjectChannel};

const POSITION_ACTUAL: (u16, u8) = (0x6064, 0);
const POSITION_SETTING: (u16, u8) = (0x2062, 0);

fn wait_for_reads<C: Fn() -> usize>(count: C, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while count() < n {
        assert!(Instant::now() < deadline, "worker never reached {n} reads");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Controller over a memory channel calibrated to [-30000, 30000] and
/// resting at `start`.
fn calibrated(
    ch: &MemoryChannel,
    tracking: TrackingCfg,
    start: i32,
) -> SteeringController<MemoryChannel, ManualClock> {
    let mut ctl = SteeringController::builder(Device::new(ch.clone()))
        .clock(ManualClock::new())
        .tracking(tracking)
        .try_build()
        .unwrap();
    ch.script_positions([-30_000, 30_000].map(Some));
    ctl.begin_calibration().unwrap();
    wait_for_reads(|| ch.read_count(POSITION_ACTUAL.0, POSITION_ACTUAL.1), 2);
    ctl.finish_calibration().unwrap();
    ch.set_position(start);
    ctl
}

#[test]
fn move_to_current_position_writes_nothing() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 1234);
    let report = ctl.move_to(Target::Position(1234)).unwrap();
    assert_eq!(report.outcome, MotionOutcome::AlreadyThere);
    assert_eq!(report.io_failures, 0);
    assert!(ch.writes().is_empty());
}

#[test]
fn uncalibrated_request_does_no_io() {
    let ch = MemoryChannel::new();
    let mut ctl = SteeringController::builder(Device::new(ch.clone()))
        .clock(ManualClock::new())
        .try_build()
        .unwrap();
    let err = ctl.move_to(Target::Angle(5.0)).unwrap_err();
    assert_eq!(err.downcast_ref::<SteerError>(), Some(&SteerError::NotCalibrated));
    assert!(ch.writes().is_empty());
    assert_eq!(ch.read_count(POSITION_ACTUAL.0, POSITION_ACTUAL.1), 0);
}

#[test]
fn out_of_range_requests_do_no_io() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    let reads = ch.read_count(POSITION_ACTUAL.0, POSITION_ACTUAL.1);

    let err = ctl.move_to(Target::Position(30_001)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SteerError>(),
        Some(SteerError::PositionOutOfRange { position: 30_001, .. })
    ));
    let err = ctl.move_to(Target::Angle(-29.5)).unwrap_err();
    assert!(err.downcast_ref::<SteerError>().is_some_and(SteerError::is_validation));
    // 25 deg is inside the angle limit but ~-33000 qc is outside the travel range.
    let err = ctl.move_to(Target::Angle(25.0)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SteerError>(),
        Some(SteerError::PositionOutOfRange { .. })
    ));

    assert!(ch.writes().is_empty());
    assert_eq!(ch.read_count(POSITION_ACTUAL.0, POSITION_ACTUAL.1), reads);
}

#[test]
fn held_position_trips_following_error_with_one_shutdown() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    let report = ctl.move_to(Target::Position(20_000)).unwrap();

    let MotionOutcome::SafetyAbort(AbortReason::FollowingError { error, limit }) = report.outcome
    else {
        panic!("expected safety abort, got {:?}", report.outcome);
    };
    assert_eq!(limit, 7500);
    assert!(error > 7500);

    // shutdown, switch on, enable operation, then exactly one shutdown.
    let cws = ch.control_words_written();
    assert_eq!(cws, vec![0x0006, 0x0007, 0x000F, 0x000E]);
    let after_enable = &cws[3..];
    let shutdowns = after_enable
        .iter()
        .filter(|&&cw| cw == ControlCommand::Shutdown.apply(0x000F))
        .count();
    assert_eq!(shutdowns, 1);

    let refs = ch.position_settings_written();
    let last = *refs.last().unwrap();
    assert!(last > 7500 && last < 20_000, "motion must not complete: {last}");
    assert!(report.into_result().is_err());
}

#[test]
fn drive_in_fault_is_reset_before_enable() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    ch.set_status_word(0x0108);
    ch.set_position(0);
    // Small move so the held position stays within the following-error limit.
    let report = ctl.move_to(Target::Position(2000)).unwrap();
    assert_eq!(report.outcome, MotionOutcome::Reached);
    assert_eq!(
        ch.control_words_written(),
        vec![0x0080, 0x0006, 0x0007, 0x000F]
    );
}

#[test]
fn unreadable_state_refuses_to_move() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    ch.set_status_word(0x0108);
    ch.fail_reads(0x6041, 0, 1);
    let err = ctl.move_to(Target::Position(1000)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SteerError>(),
        Some(SteerError::StateTransition { .. })
    ));
    assert!(ch.control_words_written().is_empty());
    assert!(ch.position_settings_written().is_empty());

    // Next attempt reads the fault and resets it.
    ctl.move_to(Target::Position(1000)).unwrap();
    assert_eq!(ch.control_words_written()[0], 0x0080);
}

#[test]
fn unknown_state_refuses_to_move() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    ch.set_status_word(0x0001);
    let err = ctl.move_to(Target::Position(1000)).unwrap_err();
    assert!(format!("{err:#}").contains("unknown"));
    assert!(ch.writes().is_empty());
}

#[test]
fn position_mode_is_selected_before_enable() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    ctl.move_to(Target::Position(1000)).unwrap();
    let writes = ch.writes();
    assert_eq!(writes[0], (0x6060, 0, vec![0xFF]));
    // Already in position mode: not written again.
    ch.set_position(0);
    let before = ch.writes_to(0x6060, 0).len();
    ctl.move_to(Target::Position(500)).unwrap();
    assert_eq!(ch.writes_to(0x6060, 0).len(), before);
}

#[test]
fn failed_transition_aborts_before_motion() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    ch.fail_writes(0x6040, 0, 2);
    let err = ctl.move_to(Target::Position(5000)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SteerError>(),
        Some(SteerError::StateTransition {
            command: ControlCommand::Shutdown,
            ..
        })
    ));
    assert!(ch.position_settings_written().is_empty());
}

#[test]
fn transient_io_failures_are_counted_and_tolerated() {
    let ch = MemoryChannel::new();
    let mut ctl = calibrated(&ch, TrackingCfg::default(), 0);
    ch.fail_writes(POSITION_SETTING.0, POSITION_SETTING.1, 3);
    // First read is the start position, then two failing loop reads.
    ch.script_positions([Some(0), None, None]);
    let report = ctl.move_to(Target::Position(5000)).unwrap();
    assert_eq!(report.outcome, MotionOutcome::Reached);
    assert_eq!(report.io_failures, 5);
    assert_eq!(ch.position_settings_written().last(), Some(&5000));
}

#[test]
fn failed_reads_skip_the_error_check() {
    let ch = MemoryChannel::new();
    let tracking = TrackingCfg {
        max_following_error: 10,
        ..Default::default()
    };
    let mut ctl = calibrated(&ch, tracking, 0);
    ch.script_positions(std::iter::once(Some(0)).chain(std::iter::repeat_n(None, 10_000)));
    let report = ctl.move_to(Target::Position(5000)).unwrap();
    assert_eq!(report.outcome, MotionOutcome::Reached);
    assert_eq!(report.io_failures, report.sample_count);
    assert_eq!(report.final_actual, None);
}

#[test]
fn references_follow_the_profile_and_end_exactly() {
    let ch = MemoryChannel::new();
    let tracking = TrackingCfg {
        record_history: true,
        ..Default::default()
    };
    let mut ctl = calibrated(&ch, tracking, -1000);
    let report = ctl.move_to(Target::Position(-4000)).unwrap();
    assert_eq!(report.outcome, MotionOutcome::Reached);

    let profile = report.profile.unwrap();
    let refs = ch.position_settings_written();
    assert_eq!(refs.len() as u64, report.sample_count);
    assert_eq!(*refs.last().unwrap(), -4000);
    assert!(refs.windows(2).all(|w| w[1] <= w[0]), "monotonic decreasing");
    // One sample per period until past t3, then one final pair.
    let expected = (profile.t3 / 0.01).floor() as u64 + 2;
    assert!(report.sample_count.abs_diff(expected) <= 1);
    assert_eq!(report.samples.len() as u64, report.sample_count);
    assert!(report.samples.last().unwrap().elapsed > profile.t3);
    assert_eq!(report.missed_deadlines, 0);
}

#[test]
fn track_move_directly_with_manual_clock() {
    let ch = MemoryChannel::new();
    let mut dev = Device::new(ch.clone());
    let clock = ManualClock::new();
    let profile = MotionProfile::plan(0, 3000, &MotionLimits::default());
    let t0 = clock.now();
    let report = steer_core::tracker::track_move(&mut dev, &clock, &profile, &TrackingCfg::default());
    assert_eq!(report.outcome, MotionOutcome::Reached);
    assert!(clock.secs_since(t0) > profile.t3);
}

fn sim_controller(drive: &SimulatedDrive) -> SteeringController<SimulatedDrive, ManualClock> {
    let mut device = Device::new(drive.clone());
    device.watch_emcy();
    let mut ctl = SteeringController::builder(device)
        .clock(ManualClock::new())
        .try_build()
        .unwrap();
    ctl.begin_calibration().unwrap();
    // A full sweep from 0 to +20000, down to -20000 and back takes 160 reads.
    let probe = drive.clone();
    wait_for_reads(|| probe.position_reads() as usize, 200);
    let summary = ctl.finish_calibration().unwrap();
    assert_eq!(summary.calibration.min_value, -20_000);
    assert_eq!(summary.calibration.max_value, 20_000);
    assert_eq!(summary.calibration.zero_reference, 0);
    ctl
}

#[test]
fn full_move_against_simulated_drive() {
    let drive = SimulatedDrive::new(1).with_operator_sweep(-20_000, 20_000, 500);
    let mut ctl = sim_controller(&drive);

    let report = ctl.move_to(Target::Angle(10.0)).unwrap();
    assert_eq!(report.outcome, MotionOutcome::Reached);
    assert_eq!(report.target, -13_332);
    assert_eq!(drive.state(), PowerState::OperationEnabled);
    assert_eq!(drive.op_mode(), -1);
    assert_eq!(drive.setpoint(), -13_332);
    assert!((drive.position() + 13_332).abs() < 100);
    assert!((ctl.current_angle().unwrap() - 10.0).abs() < 0.1);
}

#[test]
fn simulated_fault_is_reset_then_moved() {
    let drive = SimulatedDrive::new(1).with_operator_sweep(-20_000, 20_000, 500);
    let mut ctl = sim_controller(&drive);
    drive.inject_fault(0x4210);
    assert_eq!(drive.state(), PowerState::Fault);
    let report = ctl.move_to(Target::Position(1000)).unwrap();
    assert_eq!(report.outcome, MotionOutcome::Reached);
    assert_eq!(drive.state(), PowerState::OperationEnabled);
}

#[test]
fn drive_limits_are_mirrored() {
    let drive = SimulatedDrive::new(1).with_operator_sweep(-20_000, 20_000, 500);
    let mut ctl = sim_controller(&drive);
    ctl.apply_drive_limits().unwrap();
    assert_eq!(drive.software_limits(), (-20_000, 20_000));
    assert_eq!(drive.max_following_error(), 7500);
}

#[test]
fn store_and_restore_are_forwarded() {
    let mut drive = SimulatedDrive::new(1);
    let mut ctl = SteeringController::builder(Device::new(drive.clone()))
        .try_build()
        .unwrap();
    ctl.store_parameters().unwrap();
    ctl.restore_defaults().unwrap();
    assert_eq!(drive.persist_counts(), (1, 1));
    // Wrong signature is refused by the drive.
    assert!(drive.write(0x1010, 1, b"nope").is_err());
}
