mod cli;
mod error_fmt;
mod rt;
mod session;

use clap::Parser;
use cli::{Cli, Commands, DEFAULT_CONFIG, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use eyre::WrapErr;
use session::{Operator, SteerOpts};
use std::path::Path;
use steer_config::Config;
use steer_core::{SteeringController, TrackingCfg};

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: error report hooks not installed: {e}");
    }
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "steer failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    match path {
        Some(p) => steer_config::load_file(p),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() {
                steer_config::load_file(p)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn init_tracing(json: bool, level: &str, logging: &steer_config::Logging) -> eyre::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let console_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file_layer = match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file '{file}' has no file name"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer)
        .try_init()?;
    Ok(())
}

fn run(cli: Cli) -> eyre::Result<()> {
    let mut cfg = load_config(cli.config.as_deref())?;
    cli.apply_bus_overrides(&mut cfg.bus);
    cfg.validate().wrap_err("invalid configuration")?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

    let (tx, interrupt) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    }) {
        tracing::warn!(error = %e, "Ctrl+C handler not installed");
    }

    let device = session::open_drive(&cfg.bus).wrap_err("opening drive")?;

    let record_history = matches!(cli.cmd, Commands::Steer { stats: true, .. });
    let mut ctl = SteeringController::builder(device)
        .config(&cfg)?
        .tracking(TrackingCfg {
            record_history,
            ..TrackingCfg::from(&cfg.motion)
        })
        .try_build()?;

    let json = cli.json;
    match cli.cmd {
        Commands::Calibrate => {
            let op = Operator::new(interrupt);
            session::calibrate(&mut ctl, &op, json)?;
        }
        Commands::Steer {
            angles,
            stats,
            rt,
            rt_prio,
        } => {
            let op = Operator::new(interrupt);
            let opts = SteerOpts {
                angles,
                stats,
                rt,
                rt_prio,
            };
            session::run_steer(&mut ctl, &op, &opts, json)?;
        }
        Commands::State => session::print_state(&mut ctl, json)?,
        Commands::StoreConfig => {
            ctl.store_parameters()?;
            println!("drive parameters stored");
        }
        Commands::RestoreConfig => {
            ctl.restore_defaults()?;
            println!("drive defaults restored");
        }
        Commands::SelfCheck => session::self_check(&mut ctl, json)?,
    }
    Ok(())
}
