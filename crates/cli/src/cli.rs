//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Lap Synth - synthetic lap-timing feed for a timing listener
#[derive(Parser, Debug)]
#[command(
    name = "lapsynth",
    author,
    version,
    about = "Synthetic lap-timing feed for a timing listener",
    long_about = "Simulates skaters racing a configured number of laps and streams a \n\
                  split packet for every lap crossing to a timing listener over TCP.\n\n\
                  Lap times come from explicit lists or vary around an average pace."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LAPSYNTH_VERBOSE")]
    pub verbose: u8,

    /// Suppress all log output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "LAPSYNTH_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", global = true, env = "LAPSYNTH_METRICS_PORT")]
    pub metrics_port: u16,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run races and stream lap packets to the listener
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display race configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (YAML, TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config/sample-race.yml",
        env = "LAPSYNTH_CONFIG"
    )]
    pub config: PathBuf,

    /// Skip every prompt and run exactly one race
    #[arg(short, long)]
    pub yes: bool,

    /// Override listener host from configuration
    #[arg(long, env = "LAPSYNTH_HOST")]
    pub host: Option<String>,

    /// Override listener port from configuration
    #[arg(long, env = "LAPSYNTH_PORT")]
    pub port: Option<u16>,

    /// Base seed for lap-time variability (overrides configuration)
    #[arg(long, env = "LAPSYNTH_SEED")]
    pub seed: Option<u64>,

    /// Send one packet per crossing instead of two
    #[arg(long)]
    pub no_dual_transponder: bool,

    /// Directory for race-results files (overrides configuration)
    #[arg(long, env = "LAPSYNTH_RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// Also append every packet's raw bytes to this file
    #[arg(long)]
    pub capture: Option<PathBuf>,

    /// Log every packet through tracing
    #[arg(long)]
    pub log_packets: bool,

    /// Scheduler poll interval in milliseconds
    #[arg(long, default_value = "50", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_ms: u64,

    /// Per-sink queue capacity
    #[arg(long, default_value = "256", env = "LAPSYNTH_QUEUE_CAPACITY")]
    pub queue_capacity: usize,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config/sample-race.yml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/sample-race.yml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
