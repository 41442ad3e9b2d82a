//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Looked up when `--config` is not given; missing means built-in defaults.
pub const DEFAULT_CONFIG: &str = "etc/steer.toml";

#[derive(Parser, Debug)]
#[command(name = "steer", version, about = "Steering wheel drive control")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and print results as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Bus channel, e.g. can0 (overrides [bus] channel)
    #[arg(short = 'c', long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Bus type: socketcan, ixxat, ... or sim (overrides [bus] bustype)
    #[arg(short = 'b', long = "bus", value_name = "BUSTYPE")]
    pub bustype: Option<String>,

    /// Bus bitrate in bit/s (overrides [bus] bitrate)
    #[arg(short = 'r', long = "rate", value_name = "BITRATE")]
    pub bitrate: Option<u32>,

    /// Drive node id 1..=127 (overrides [bus] node_id)
    #[arg(long = "node-id", value_name = "ID")]
    pub node_id: Option<u8>,

    /// Device description file forwarded to the transport
    #[arg(long = "obj-dict", value_name = "FILE")]
    pub object_dictionary: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record the wheel's travel range while the operator turns it
    Calibrate,
    /// Calibrate, then move to targets read from stdin (one per line)
    Steer {
        /// Targets are steering angles in degrees instead of qc positions
        #[arg(long, action = ArgAction::SetTrue)]
        angles: bool,
        /// Print tracking loop timing stats after each move
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
        /// Enable real-time mode (SCHED_FIFO, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority and calls mlockall(MCL_CURRENT|MCL_FUTURE) to lock the process address space into RAM. This reduces page faults and jitter in the tracking loop but may require elevated privileges or ulimits (e.g., memlock). Failures are reported as warnings and the run continues."
        )]
        rt: bool,
        /// Real-time priority for SCHED_FIFO on Linux (1..=max)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
    },
    /// Print the drive state with status and control word bits
    State,
    /// Persist the drive's current parameters to its non-volatile memory
    StoreConfig,
    /// Restore the drive's factory default parameters
    RestoreConfig,
    /// Quick health check: open the drive and read its state
    SelfCheck,
}

impl Cli {
    /// Apply bus flags on top of the `[bus]` table.
    pub fn apply_bus_overrides(&self, bus: &mut steer_config::Bus) {
        if let Some(c) = &self.channel {
            bus.channel = c.clone();
        }
        if let Some(b) = &self.bustype {
            bus.bustype = b.clone();
        }
        if let Some(r) = self.bitrate {
            bus.bitrate = Some(r);
        }
        if let Some(id) = self.node_id {
            bus.node_id = id;
        }
        if let Some(od) = &self.object_dictionary {
            bus.object_dictionary = Some(od.clone());
        }
    }
}
