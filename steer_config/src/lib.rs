#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the steering controller.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! `Config::validate` rejects values the motion core cannot run with.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Bus {
    /// Bus channel, e.g. "can0".
    pub channel: String,
    /// Bus backend; "sim" selects the in-process simulated drive.
    pub bustype: String,
    pub bitrate: Option<u32>,
    pub node_id: u8,
    /// Device description file (EDS), forwarded opaquely to the transport.
    pub object_dictionary: Option<String>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            channel: "can0".into(),
            bustype: "socketcan".into(),
            bitrate: None,
            node_id: 1,
            object_dictionary: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MotionCfg {
    /// Time to complete one encoder revolution at max speed (s)
    pub t_max_s: f64,
    pub counts_per_rev: u32,
    /// qc/s^2
    pub max_acceleration: f64,
    /// Abort threshold on |reference - actual| (qc)
    pub max_following_error: u32,
    pub sample_period_ms: u64,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            t_max_s: 0.2,
            counts_per_rev: 14_400,
            max_acceleration: 6000.0,
            max_following_error: 7500,
            sample_period_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CalibrationCfg {
    pub sample_period_ms: u64,
    /// Degrees of steering angle per quadrature count.
    pub qc_to_delta: f64,
    pub max_angle_deg: f64,
    /// How long to wait for the worker's result after stop is requested.
    pub result_timeout_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            sample_period_ms: 10,
            qc_to_delta: -7.501e-4,
            max_angle_deg: 29.0,
            result_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateTableKind {
    /// Classification table as shipped with the original drive tooling.
    #[default]
    Legacy,
    /// Every row uses the common mask.
    Uniform,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct StateMachineCfg {
    pub table: StateTableKind,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub bus: Bus,
    pub motion: MotionCfg,
    pub calibration: CalibrationCfg,
    pub state_machine: StateMachineCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))
}

const MAX_PERIOD_MS: u64 = 1000;

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Bus
        if self.bus.channel.trim().is_empty() {
            eyre::bail!("bus.channel must not be empty");
        }
        if !(1..=127).contains(&self.bus.node_id) {
            eyre::bail!("bus.node_id must be in 1..=127");
        }
        if self.bus.bitrate == Some(0) {
            eyre::bail!("bus.bitrate must be > 0");
        }

        // Motion
        if !(self.motion.t_max_s.is_finite() && self.motion.t_max_s > 0.0) {
            eyre::bail!("motion.t_max_s must be > 0");
        }
        if self.motion.counts_per_rev == 0 {
            eyre::bail!("motion.counts_per_rev must be > 0");
        }
        if !(self.motion.max_acceleration.is_finite() && self.motion.max_acceleration > 0.0) {
            eyre::bail!("motion.max_acceleration must be > 0");
        }
        if self.motion.max_following_error == 0 {
            eyre::bail!("motion.max_following_error must be >= 1");
        }
        if self.motion.sample_period_ms == 0 || self.motion.sample_period_ms > MAX_PERIOD_MS {
            eyre::bail!("motion.sample_period_ms must be in 1..={MAX_PERIOD_MS}");
        }

        // Calibration
        if self.calibration.sample_period_ms == 0
            || self.calibration.sample_period_ms > MAX_PERIOD_MS
        {
            eyre::bail!("calibration.sample_period_ms must be in 1..={MAX_PERIOD_MS}");
        }
        if !self.calibration.qc_to_delta.is_finite() || self.calibration.qc_to_delta == 0.0 {
            eyre::bail!("calibration.qc_to_delta must be finite and non-zero");
        }
        if !(self.calibration.max_angle_deg > 0.0 && self.calibration.max_angle_deg <= 90.0) {
            eyre::bail!("calibration.max_angle_deg must be in (0, 90]");
        }
        if self.calibration.result_timeout_ms == 0 {
            eyre::bail!("calibration.result_timeout_ms must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
