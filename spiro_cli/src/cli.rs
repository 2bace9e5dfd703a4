//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "spiro", version, about = "Streaming respiratory monitor")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/spiro_config.toml")]
    pub config: PathBuf,

    /// Print JSON lines instead of text, and log as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitor and print one line per breath
    Monitor {
        /// How long to monitor, in seconds of sensor time
        #[arg(long = "duration-s", value_name = "SECONDS")]
        duration_s: f64,
        /// Mouthpiece calibration to use (overrides calibration.mouthpiece)
        #[arg(long, value_name = "ID")]
        mouthpiece: Option<String>,
        /// Replay a recorded session instead of the simulated breather
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,
        /// Process inline without cadence threads (overrides runner.mode)
        #[arg(long, action = ArgAction::SetTrue)]
        direct: bool,
        /// Print rolling parameter statistics and cadence counters at the end
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Load every calibration table and print flow for sample pressures
    CheckCalibration {
        /// Differential pressures (cmH2O) to evaluate, comma separated
        #[arg(long, value_name = "LIST", value_delimiter = ',', allow_negative_numbers = true)]
        dp: Vec<f64>,
    },
    /// Validate config and calibration, then take one sensor read
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
