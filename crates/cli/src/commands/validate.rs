//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{PaceSource, RaceConfig};
use race_engine::MIN_LAP_SECS;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Dual-transponder delays above this are most likely a unit mistake
const LONG_DUAL_DELAY_MS: f64 = 1000.0;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    laps: f64,
    lap_events_per_skater: u32,
    skater_count: usize,
    listener: String,
    dual_transponder: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    laps: config.race.laps,
                    lap_events_per_skater: config
                        .lap_target()
                        .map(|t| t.event_count())
                        .unwrap_or_default(),
                    skater_count: config.skaters.len(),
                    listener: config.race.tcp.address(),
                    dual_transponder: config.race.dual_transponder.delay().is_some(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &RaceConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let events = config
        .lap_target()
        .map(|t| t.event_count())
        .unwrap_or_default();

    for skater in &config.skaters {
        match skater.pace_source() {
            Some(PaceSource::Explicit(times)) if (times.len() as u32) < events => {
                warnings.push(format!(
                    "Lane {} lists {} lap times for {} laps - the last time repeats",
                    skater.lane,
                    times.len(),
                    events
                ));
            }
            Some(PaceSource::Explicit(times)) if (times.len() as u32) > events => {
                warnings.push(format!(
                    "Lane {} lists {} lap times for {} laps - extra times are ignored",
                    skater.lane,
                    times.len(),
                    events
                ));
            }
            Some(PaceSource::Average(average)) if average < MIN_LAP_SECS => {
                warnings.push(format!(
                    "Lane {} average lap of {}s is below the {}s minimum and will be clamped",
                    skater.lane, average, MIN_LAP_SECS
                ));
            }
            _ => {}
        }
    }

    let dual = &config.race.dual_transponder;
    if dual.enabled && dual.delay_milliseconds > LONG_DUAL_DELAY_MS {
        warnings.push(format!(
            "race.dual_transponder.delay_milliseconds is {} - second packet arrives over a second late",
            dual.delay_milliseconds
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Laps: {}", summary.laps);
            println!("  Lap events per skater: {}", summary.lap_events_per_skater);
            println!("  Skaters: {}", summary.skater_count);
            println!("  Listener: {}", summary.listener);
            println!(
                "  Dual transponder: {}",
                if summary.dual_transponder { "on" } else { "off" }
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
