//! # Lap Synth CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 比赛运行与交互式控制台
//! - 比赛结果文件输出

mod cli;
mod commands;
mod console;
mod error;
mod race;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_races, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(observability_config(&cli))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Lap Synth starting");

    let result = match &cli.command {
        Commands::Run(args) => run_races(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Map CLI logging options onto the observability config
fn observability_config(cli: &Cli) -> ObservabilityConfig {
    let (default_log_level, respect_env) = if cli.quiet {
        ("warn", false)
    } else {
        match cli.verbose {
            0 => ("info", true),
            1 => ("debug", true),
            _ => ("trace", true),
        }
    };

    ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: (cli.metrics_port != 0).then_some(cli.metrics_port),
        default_log_level: default_log_level.to_string(),
        respect_env,
    }
}
