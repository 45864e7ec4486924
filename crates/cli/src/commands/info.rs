//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{PaceSource, RaceConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    race: RaceInfo,
    skaters: Vec<SkaterInfo>,
    results_dir: String,
}

#[derive(Serialize)]
struct RaceInfo {
    laps: f64,
    half_lap: bool,
    lap_events_per_skater: u32,
    listener: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dual_transponder_delay_ms: Option<f64>,
    send_zero_packet: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct SkaterInfo {
    lane: u8,
    pace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    average_split_time: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    times: Vec<f64>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &RaceConfig) -> ConfigInfo {
    let target = config.lap_target();
    let labels = config
        .race
        .labels
        .to_labels()
        .map(|l| l.fields().into_iter().map(str::to_string).collect())
        .unwrap_or_default();

    let skaters = config
        .skaters
        .iter()
        .map(|s| {
            let (pace, average_split_time, times) = match s.pace_source() {
                Some(PaceSource::Average(avg)) => ("average", Some(avg), Vec::new()),
                Some(PaceSource::Explicit(times)) => ("explicit", None, times),
                None => ("none", None, Vec::new()),
            };
            SkaterInfo {
                lane: s.lane,
                pace: pace.to_string(),
                average_split_time,
                times,
            }
        })
        .collect();

    ConfigInfo {
        race: RaceInfo {
            laps: config.race.laps,
            half_lap: target.is_some_and(|t| t.has_half_lap()),
            lap_events_per_skater: target.map(|t| t.event_count()).unwrap_or_default(),
            listener: config.race.tcp.address(),
            dual_transponder_delay_ms: config
                .race
                .dual_transponder
                .enabled
                .then_some(config.race.dual_transponder.delay_milliseconds),
            send_zero_packet: config.race.send_zero_packet,
            labels,
            seed: config.race.seed,
        },
        skaters,
        results_dir: config.output.results_dir.display().to_string(),
    }
}

fn print_config_info(config: &RaceConfig) {
    let info = build_config_info(config);
    let race = &info.race;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                Lap Synth Race Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🏁 Race");
    println!(
        "   ├─ Distance: {} laps ({} lap events per skater{})",
        race.laps,
        race.lap_events_per_skater,
        if race.half_lap { ", leading half lap" } else { "" }
    );
    println!("   ├─ Listener: {}", race.listener);
    match race.dual_transponder_delay_ms {
        Some(ms) => println!("   ├─ Dual transponder: {} ms", ms),
        None => println!("   ├─ Dual transponder: off"),
    }
    println!(
        "   ├─ Zero packet: {}",
        if race.send_zero_packet { "yes" } else { "no (Internal Sync)" }
    );
    if !race.labels.is_empty() {
        println!("   ├─ Labels: {}", race.labels.join(","));
    }
    match race.seed {
        Some(seed) => println!("   └─ Seed: {}", seed),
        None => println!("   └─ Seed: (random)"),
    }

    println!("\n⛸  Skaters ({})", info.skaters.len());
    for (i, skater) in info.skaters.iter().enumerate() {
        let prefix = if i + 1 == info.skaters.len() { "└─" } else { "├─" };
        match (skater.average_split_time, skater.times.as_slice()) {
            (Some(avg), _) => println!("   {} Lane {:>2}: average {:.3}s", prefix, skater.lane, avg),
            (None, times) if !times.is_empty() => println!(
                "   {} Lane {:>2}: explicit {:?}",
                prefix, skater.lane, times
            ),
            _ => println!("   {} Lane {:>2}: no pace", prefix, skater.lane),
        }
    }

    println!("\n📄 Results: {}", info.results_dir);
    println!();
}
