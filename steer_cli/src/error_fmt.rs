//! Human-readable error descriptions, exit codes and structured JSON errors.

use steer_core::error::{AbortReason, BuildError, SteerError};

pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_SAFETY_ABORT: i32 = 3;
pub const EXIT_VALIDATION: i32 = 4;
pub const EXIT_STATE_TRANSITION: i32 = 5;
pub const EXIT_UNREACHABLE: i32 = 6;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the [motion] or [calibration] tables.\nHow to fix: Edit the config file, then rerun. See etc/steer.toml for a sample."
        );
    }

    if let Some(se) = err.downcast_ref::<SteerError>() {
        return match se {
            SteerError::Abort(AbortReason::FollowingError { error, limit }) => format!(
                "What happened: Following error of {error} qc exceeded the {limit} qc limit; the drive was shut down.\nLikely causes: The wheel is blocked or held, the motor lost power, or the limit is too tight for the configured speed.\nHow to fix: Free the wheel, check motor power, or raise motion.max_following_error / lower the speed."
            ),
            SteerError::NotCalibrated => "What happened: No calibration is available.\nLikely causes: Calibration was not run or did not finish.\nHow to fix: Run `steer calibrate` (or restart `steer steer`) and turn the wheel to both extremes.".to_string(),
            SteerError::AngleOutOfRange { angle, max } => format!(
                "What happened: Angle {angle:.2} deg is outside the allowed +/-{max} deg.\nHow to fix: Request a smaller angle or raise calibration.max_angle_deg."
            ),
            SteerError::PositionOutOfRange { position, min, max } => format!(
                "What happened: Position {position} qc is outside the calibrated travel [{min}, {max}].\nLikely causes: The wheel was not turned fully during calibration.\nHow to fix: Recalibrate, turning the wheel to both end stops."
            ),
            SteerError::StateTransition { command, reason } => format!(
                "What happened: The drive did not accept '{command}' ({reason}).\nLikely causes: Bus communication failure or the drive is in a state that refuses the command.\nHow to fix: Run `steer state` to inspect the status word and clear any fault."
            ),
            SteerError::DeviceUnavailable(detail) => format!(
                "What happened: The drive could not be reached ({detail}).\nLikely causes: Wrong bus type/channel/node id, the bus is down, or the drive has no power.\nHow to fix: Check -b/-c/--node-id (or [bus] in the config), the cabling and the drive's supply."
            ),
            SteerError::Timeout => "What happened: The drive did not answer in time.\nLikely causes: Bus overload, wrong bitrate, or a disconnected node.\nHow to fix: Verify -r/--rate and the cabling.".to_string(),
            SteerError::SdoAbort { code, text } => format!(
                "What happened: The drive rejected an object access (0x{code:08X}: {text}).\nHow to fix: Check that the node id addresses the right drive and that it supports this object."
            ),
            SteerError::CalibrationTimeout(t) => format!(
                "What happened: The calibration worker did not report within {t:?}; the drive handle is lost.\nLikely causes: A bus call hung.\nHow to fix: Restart the program and check the bus."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.starts_with("invalid configuration")
        || lower.starts_with("parse config")
        || lower.starts_with("read config")
    {
        return format!(
            "What happened: Configuration is invalid ({}).\nHow to fix: Edit the TOML config and try again.",
            err.root_cause()
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes; clap usage errors exit with 2 on their own.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<SteerError>() {
        Some(SteerError::Abort(_)) => EXIT_SAFETY_ABORT,
        Some(e) if e.is_validation() => EXIT_VALIDATION,
        Some(SteerError::StateTransition { .. }) => EXIT_STATE_TRANSITION,
        Some(SteerError::DeviceUnavailable(_)) => EXIT_UNREACHABLE,
        _ => EXIT_GENERIC,
    }
}

pub fn reason_name(err: &SteerError) -> &'static str {
    match err {
        SteerError::Abort(AbortReason::FollowingError { .. }) => "FollowingError",
        SteerError::NotCalibrated => "NotCalibrated",
        SteerError::AngleOutOfRange { .. } => "AngleOutOfRange",
        SteerError::PositionOutOfRange { .. } => "PositionOutOfRange",
        SteerError::StateTransition { .. } => "StateTransition",
        SteerError::DeviceUnavailable(_) => "DeviceUnavailable",
        SteerError::Timeout => "Timeout",
        SteerError::SdoAbort { .. } => "SdoAbort",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    match err.downcast_ref::<SteerError>() {
        Some(SteerError::Abort(AbortReason::FollowingError { error, limit })) => json!({
            "reason": "FollowingError",
            "details": { "error_qc": error, "limit_qc": limit },
            "message": msg,
        })
        .to_string(),
        Some(SteerError::PositionOutOfRange { position, min, max }) => json!({
            "reason": "PositionOutOfRange",
            "details": { "position": position, "min": min, "max": max },
            "message": msg,
        })
        .to_string(),
        Some(se) => json!({ "reason": reason_name(se), "message": msg }).to_string(),
        None => json!({ "reason": "Error", "message": msg }).to_string(),
    }
}
