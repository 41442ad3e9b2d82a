//! Command execution: drive assembly, operator input and the steering session.

use crate::error_fmt::humanize;
use crate::rt::setup_rt_once;
use crossbeam_channel::{self as xch, Receiver, select};
use serde_json::json;
use std::io::{BufRead, Write};
use steer_core::state::{describe_control_word, describe_status_word};
use steer_core::{
    CalibrationSummary, Device, MotionOutcome, MotionReport, SteerError, SteeringController,
    Target,
};
use steer_traits::ObjectChannel;

pub type Drive = Box<dyn ObjectChannel + Send>;
pub type Controller = SteeringController<Drive>;

/// Range the simulated operator turns the wheel through during calibration.
const SIM_SWEEP: (i32, i32, i32) = (-20_000, 20_000, 200);

/// Open the drive named by `[bus]` and prove it answers.
///
/// Only the in-process simulator ships with this binary; other bus types
/// are reported as unreachable.
pub fn open_drive(bus: &steer_config::Bus) -> Result<Device<Drive>, SteerError> {
    let channel: Drive = match bus.bustype.as_str() {
        "sim" => {
            let (min, max, step) = SIM_SWEEP;
            Box::new(
                steer_hardware::SimulatedDrive::new(bus.node_id)
                    .with_operator_sweep(min, max, step),
            )
        }
        other => {
            return Err(SteerError::DeviceUnavailable(format!(
                "bus type '{other}' on channel '{}' has no transport in this build (use -b sim)",
                bus.channel
            )));
        }
    };
    let mut device = Device::new(channel);
    device.watch_emcy();
    let state = device.read_state().map_err(|e| {
        SteerError::DeviceUnavailable(format!("node {} did not answer: {e}", bus.node_id))
    })?;
    tracing::info!(
        bustype = %bus.bustype,
        channel = %bus.channel,
        bitrate = ?bus.bitrate,
        node_id = bus.node_id,
        %state,
        "drive connected"
    );
    Ok(device)
}

pub enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// Operator input: stdin lines and Ctrl+C, whichever comes first.
pub struct Operator {
    lines: Receiver<String>,
    interrupt: Receiver<()>,
}

impl Operator {
    pub fn new(interrupt: Receiver<()>) -> Self {
        let (tx, lines) = xch::bounded(16);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "stdin closed");
                        break;
                    }
                }
            }
        });
        Self { lines, interrupt }
    }

    pub fn next(&self) -> Input {
        select! {
            recv(self.lines) -> msg => match msg {
                Ok(l) => Input::Line(l),
                Err(_) => Input::Eof,
            },
            recv(self.interrupt) -> _ => Input::Interrupted,
        }
    }
}

fn prompt(text: &str) {
    eprint!("{text}");
    let _ = std::io::stderr().flush();
}

/// Run one calibration. `None` when the operator interrupted it; the
/// samples of an interrupted run are discarded.
pub fn calibrate(
    ctl: &mut Controller,
    op: &Operator,
    json: bool,
) -> eyre::Result<Option<CalibrationSummary>> {
    ctl.begin_calibration()?;
    prompt("Calibrating: turn the wheel to both end stops, then press Enter... ");
    if matches!(op.next(), Input::Interrupted) {
        ctl.cancel_calibration()?;
        eprintln!("\ninterrupted, calibration discarded");
        return Ok(None);
    }
    let summary = ctl.finish_calibration()?;
    let cal = summary.calibration;
    if json {
        println!(
            "{}",
            json!({
                "event": "calibrated",
                "min": cal.min_value,
                "max": cal.max_value,
                "zero": cal.zero_reference,
                "samples": summary.samples,
                "failures": summary.failures,
            })
        );
    } else {
        println!(
            "calibrated: min={} max={} zero={} samples={} failures={}",
            cal.min_value, cal.max_value, cal.zero_reference, summary.samples, summary.failures
        );
    }
    Ok(Some(summary))
}

fn parse_target(line: &str, angles: bool) -> Option<Target> {
    if angles {
        line.parse::<f64>().ok().map(Target::Angle)
    } else {
        line.parse::<i32>().ok().map(Target::Position)
    }
}

pub struct SteerOpts {
    pub angles: bool,
    pub stats: bool,
    pub rt: bool,
    pub rt_prio: Option<i32>,
}

/// Calibrate, then follow targets from stdin until EOF, an empty line or Ctrl+C.
pub fn run_steer(
    ctl: &mut Controller,
    op: &Operator,
    opts: &SteerOpts,
    json: bool,
) -> eyre::Result<()> {
    if calibrate(ctl, op, json)?.is_none() {
        ctl.shutdown();
        return Ok(());
    }
    if let Err(e) = ctl.apply_drive_limits() {
        tracing::warn!(error = %e, "drive limits not applied");
    }
    setup_rt_once(opts.rt, opts.rt_prio);

    let unit = if opts.angles { "deg" } else { "qc" };
    let result = loop {
        prompt(&format!("target ({unit})> "));
        let line = match op.next() {
            Input::Line(l) => l,
            Input::Eof => break Ok(()),
            Input::Interrupted => {
                eprintln!("\ninterrupted");
                break Ok(());
            }
        };
        let line = line.trim();
        if line.is_empty() {
            break Ok(());
        }
        let Some(target) = parse_target(line, opts.angles) else {
            eprintln!("not a number: '{line}'");
            continue;
        };
        match ctl.move_to(target) {
            Ok(report) => {
                print_report(&report, json);
                if opts.stats {
                    print_stats(&report, ctl.tracking().sample_period);
                }
                if let MotionOutcome::SafetyAbort(reason) = report.outcome {
                    break Err(eyre::Report::new(SteerError::Abort(reason)));
                }
            }
            Err(e) => {
                let validation = e
                    .downcast_ref::<SteerError>()
                    .is_some_and(SteerError::is_validation);
                if !validation {
                    break Err(e);
                }
                eprintln!("{}", humanize(&e));
            }
        }
    };
    // The tracker already shut the drive down on a safety abort.
    if !ends_in_safety_abort(&result) {
        ctl.shutdown();
    }
    result
}

fn ends_in_safety_abort(result: &eyre::Result<()>) -> bool {
    result.as_ref().is_err_and(|e| {
        matches!(e.downcast_ref::<SteerError>(), Some(SteerError::Abort(_)))
    })
}

fn print_report(report: &MotionReport, json: bool) {
    let outcome = match report.outcome {
        MotionOutcome::Reached => "reached",
        MotionOutcome::AlreadyThere => "already_there",
        MotionOutcome::SafetyAbort(_) => "safety_abort",
    };
    if json {
        println!(
            "{}",
            json!({
                "event": "move",
                "outcome": outcome,
                "target": report.target,
                "final_actual": report.final_actual,
                "io_failures": report.io_failures,
                "samples": report.sample_count,
                "duration_s": report.profile.map(|p| p.duration()),
            })
        );
        return;
    }
    match report.outcome {
        MotionOutcome::Reached => println!(
            "reached {} qc (actual {}, io failures {})",
            report.target,
            report
                .final_actual
                .map_or_else(|| "?".to_string(), |a| a.to_string()),
            report.io_failures
        ),
        MotionOutcome::AlreadyThere => println!("already at {} qc", report.target),
        MotionOutcome::SafetyAbort(reason) => println!("aborted: {reason}"),
    }
}

/// Print sample spacing and deadline stats to stderr.
fn print_stats(report: &MotionReport, period: std::time::Duration) {
    let gaps_ms: Vec<f64> = report
        .samples
        .windows(2)
        .map(|w| (w[1].elapsed - w[0].elapsed) * 1000.0)
        .collect();
    let (min, max, avg, stdev) = if gaps_ms.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let min = gaps_ms.iter().copied().fold(f64::INFINITY, f64::min);
        let max = gaps_ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let n = gaps_ms.len() as f64;
        let avg = gaps_ms.iter().sum::<f64>() / n;
        let stdev = if gaps_ms.len() > 1 {
            (gaps_ms.iter().map(|g| (g - avg).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        (min, max, avg, stdev)
    };
    eprintln!("\n--- Tracking Stats ---");
    eprintln!("Samples: {}", report.sample_count);
    eprintln!("Period (ms): {}", period.as_millis());
    eprintln!("Spacing min/avg/max/stdev (ms): {min:.2} / {avg:.2} / {max:.2} / {stdev:.2}");
    eprintln!("Missed deadlines: {}", report.missed_deadlines);
    eprintln!("I/O failures: {}", report.io_failures);
    eprintln!("----------------------\n");
}

pub fn print_state(ctl: &mut Controller, json: bool) -> eyre::Result<()> {
    let dev = ctl.device_mut()?;
    let state = dev.read_state()?;
    let status_word = dev.read_status_word()?;
    let control_word = dev.read_control_word()?;
    let op_mode = dev.read_op_mode_display().ok();
    if json {
        println!(
            "{}",
            json!({
                "state": state.to_string(),
                "status_word": status_word,
                "control_word": control_word,
                "op_mode": op_mode.map(|m| m.to_string()),
            })
        );
        return Ok(());
    }
    println!("state: {state}");
    if let Some(mode) = op_mode {
        println!("op mode: {mode}");
    }
    println!("status word: 0x{status_word:04X}");
    for line in describe_status_word(status_word) {
        println!("  {line}");
    }
    println!("control word: 0x{control_word:04X}");
    for line in describe_control_word(control_word) {
        println!("  {line}");
    }
    Ok(())
}

pub fn self_check(ctl: &mut Controller, json: bool) -> eyre::Result<()> {
    let state = ctl.read_state()?;
    let position = ctl.device_mut()?.read_position()?;
    if json {
        println!(
            "{}",
            json!({ "ok": true, "state": state.to_string(), "position": position })
        );
    } else {
        println!("ok: state={state} position={position} qc");
    }
    Ok(())
}
