mod checks;
mod cli;
mod error_fmt;
mod monitor;

use clap::Parser;
use eyre::WrapErr;
use spiro_config::Config;
use spiro_core::error::MonitorError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::monitor::MonitorOpts;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error hooks: {e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let json = JSON_MODE.get().copied().unwrap_or(false);
            if json {
                println!("{}", format_error_json(&err));
            } else {
                println!("{}", humanize(&err));
            }
            tracing::debug!(error = ?err, "command failed");
            let code = exit_code_for_error(&err);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let (mut cfg, base) = load_config(&cli.config)?;
    init_tracing(&cli, &cfg, &base)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "could not install Ctrl-C handler");
        }
    }

    match cli.cmd {
        Commands::Monitor {
            duration_s,
            mouthpiece,
            replay,
            direct,
            stats,
        } => {
            if let Some(id) = mouthpiece {
                cfg.calibration.mouthpiece = id;
            }
            let opts = MonitorOpts {
                duration_s,
                replay,
                direct,
                stats,
                json: cli.json,
            };
            monitor::run_monitor(&cfg, &base, &opts, &shutdown)?;
        }
        Commands::CheckCalibration { dp } => checks::check_calibration(&cfg, &base, &dp, cli.json)?,
        Commands::SelfCheck => checks::self_check(&cfg, &base)?,
        Commands::Health => checks::health(&cfg, &base)?,
    }
    Ok(())
}

/// Read, parse and validate the TOML; relative paths resolve against its directory.
fn load_config(path: &Path) -> eyre::Result<(Config, PathBuf)> {
    let config_err = |msg: String| eyre::Report::new(MonitorError::Config(msg));

    let text = std::fs::read_to_string(path)
        .map_err(|e| config_err(format!("reading {}: {e}", path.display())))?;
    let cfg = spiro_config::load_toml(&text)
        .map_err(|e| config_err(format!("parsing {}: {e}", path.display())))?;
    cfg.validate().map_err(|e| config_err(format!("{e:#}")))?;

    let base = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((cfg, base))
}

fn init_tracing(cli: &Cli, cfg: &Config, base: &Path) -> eyre::Result<()> {
    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries breath lines, so the console layer writes to stderr
    let console = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match &cfg.logging.file {
        Some(file) => {
            let path = base.join(file);
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)
                .wrap_err_with(|| format!("creating log directory {}", dir.display()))?;
            let name = path
                .file_name()
                .map_or_else(|| "spiro.log".into(), |n| n.to_os_string());
            let appender = match cfg.logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(&dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(&dir, name),
                _ => tracing_appender::rolling::never(&dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    // A second init (tests, embedding) is not an error worth failing on.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
    Ok(())
}
