//! Configuration validation
//!
//! Rules:
//! - laps finite, > 0, whole or whole + .5
//! - 1..=10 skaters, lanes in range and unique
//! - exactly one pace source per skater, all durations > 0
//! - TCP port non-zero, dual-transponder delay finite and >= 0
//! - label nesting (round requires event, heat requires round)
//!
//! The race engine trusts these guarantees and does not re-check them.

use std::collections::HashSet;

use contracts::{ContractError, LapTarget, RaceConfig, SkaterConfig, MAX_LANE, MIN_LANE};

/// Maximum number of skaters in one race
pub const MAX_SKATERS: usize = 10;

/// Longest dual-transponder delay accepted (one minute)
pub const MAX_DUAL_DELAY_MS: f64 = 60_000.0;

/// Validate a `RaceConfig`
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &RaceConfig) -> Result<(), ContractError> {
    validate_laps(config)?;
    validate_skater_count(config)?;
    validate_lanes(config)?;
    validate_pace_sources(config)?;
    validate_tcp(config)?;
    validate_dual_transponder(config)?;
    validate_labels(config)?;
    Ok(())
}

fn validate_laps(config: &RaceConfig) -> Result<(), ContractError> {
    let laps = config.race.laps;
    if LapTarget::from_laps(laps).is_none() {
        return Err(ContractError::config_validation(
            "race.laps",
            format!("laps must be a positive whole number or end in .5, got {laps}"),
        ));
    }
    Ok(())
}

fn validate_skater_count(config: &RaceConfig) -> Result<(), ContractError> {
    let count = config.skaters.len();
    if count == 0 || count > MAX_SKATERS {
        return Err(ContractError::config_validation(
            "skaters",
            format!("expected 1..={MAX_SKATERS} skaters, got {count}"),
        ));
    }
    Ok(())
}

/// Lane range and uniqueness
fn validate_lanes(config: &RaceConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, skater) in config.skaters.iter().enumerate() {
        if !(MIN_LANE..=MAX_LANE).contains(&skater.lane) {
            return Err(ContractError::config_validation(
                format!("skaters[{idx}].lane"),
                format!(
                    "lane must be in {MIN_LANE}..={MAX_LANE}, got {}",
                    skater.lane
                ),
            ));
        }
        if !seen.insert(skater.lane) {
            return Err(ContractError::config_validation(
                format!("skaters[{idx}].lane"),
                format!("duplicate lane {}", skater.lane),
            ));
        }
    }
    Ok(())
}

fn validate_pace_sources(config: &RaceConfig) -> Result<(), ContractError> {
    for (idx, skater) in config.skaters.iter().enumerate() {
        validate_pace_source(idx, skater)?;
    }
    Ok(())
}

fn validate_pace_source(idx: usize, skater: &SkaterConfig) -> Result<(), ContractError> {
    match (skater.average_split_time, skater.times.as_deref()) {
        (Some(_), Some(_)) => Err(ContractError::config_validation(
            format!("skaters[{idx}]"),
            "average_split_time and times are mutually exclusive",
        )),
        (None, None) => Err(ContractError::config_validation(
            format!("skaters[{idx}]"),
            "either average_split_time or times is required",
        )),
        (Some(average), None) => {
            if !average.is_finite() || average <= 0.0 {
                return Err(ContractError::config_validation(
                    format!("skaters[{idx}].average_split_time"),
                    format!("average_split_time must be > 0, got {average}"),
                ));
            }
            Ok(())
        }
        (None, Some(times)) => {
            if times.is_empty() {
                return Err(ContractError::config_validation(
                    format!("skaters[{idx}].times"),
                    "times cannot be empty",
                ));
            }
            if let Some((pos, bad)) = times
                .iter()
                .enumerate()
                .find(|(_, t)| !t.is_finite() || **t <= 0.0)
            {
                return Err(ContractError::config_validation(
                    format!("skaters[{idx}].times[{pos}]"),
                    format!("lap time must be > 0, got {bad}"),
                ));
            }
            Ok(())
        }
    }
}

fn validate_tcp(config: &RaceConfig) -> Result<(), ContractError> {
    let tcp = &config.race.tcp;
    if tcp.host.trim().is_empty() {
        return Err(ContractError::config_validation(
            "race.tcp.host",
            "host cannot be empty",
        ));
    }
    if tcp.port == 0 {
        return Err(ContractError::config_validation(
            "race.tcp.port",
            "port must be non-zero",
        ));
    }
    Ok(())
}

fn validate_dual_transponder(config: &RaceConfig) -> Result<(), ContractError> {
    let delay = config.race.dual_transponder.delay_milliseconds;
    if !delay.is_finite() || !(0.0..=MAX_DUAL_DELAY_MS).contains(&delay) {
        return Err(ContractError::config_validation(
            "race.dual_transponder.delay_milliseconds",
            format!("delay must be between 0 and {MAX_DUAL_DELAY_MS} ms, got {delay}"),
        ));
    }
    Ok(())
}

fn validate_labels(config: &RaceConfig) -> Result<(), ContractError> {
    let labels = &config.race.labels;
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());

    if present(&labels.round) && !present(&labels.event) {
        return Err(ContractError::config_validation(
            "race.labels.round",
            "round label requires an event label",
        ));
    }
    if present(&labels.heat) && !present(&labels.round) {
        return Err(ContractError::config_validation(
            "race.labels.heat",
            "heat label requires a round label",
        ));
    }
    for (field, value) in [
        ("race.labels.event", &labels.event),
        ("race.labels.round", &labels.round),
        ("race.labels.heat", &labels.heat),
    ] {
        if value.as_deref().is_some_and(|v| v.contains([',', '\r', '\n'])) {
            return Err(ContractError::config_validation(
                field,
                "labels cannot contain commas or line breaks",
            ));
        }
    }
    Ok(())
}
