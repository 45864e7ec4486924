//! RaceConfig - Config Loader output
//!
//! Describes a race run: distance, listener endpoint, transponder emulation,
//! packet labels, skaters and output locations.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{ContractError, EventLabel, Lane, LapTarget, PaceSource, Race, Skater, Timestamp};

/// Complete race configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Race settings
    pub race: RaceSettings,

    /// Skaters in configuration order
    pub skaters: Vec<SkaterConfig>,

    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,
}

/// Race-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSettings {
    /// Lap count (whole, or whole + .5)
    pub laps: f64,

    /// Timing listener endpoint
    #[serde(default)]
    pub tcp: TcpSettings,

    /// Two-sensor emulation
    #[serde(default)]
    pub dual_transponder: DualTransponderSettings,

    /// Optional event / round / heat labels appended to split packets
    #[serde(default)]
    pub labels: LabelConfig,

    /// Send a `Z` packet at race start (otherwise the listener uses Internal Sync)
    #[serde(default)]
    pub send_zero_packet: bool,

    /// Base seed for lap-time variability (random when absent)
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Timing listener endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl TcpSettings {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    2002
}

/// Dual-transponder emulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualTransponderSettings {
    #[serde(default = "default_dual_enabled")]
    pub enabled: bool,

    /// Delay between the two reports of one crossing
    #[serde(default = "default_dual_delay_ms")]
    pub delay_milliseconds: f64,
}

impl Default for DualTransponderSettings {
    fn default() -> Self {
        Self {
            enabled: default_dual_enabled(),
            delay_milliseconds: default_dual_delay_ms(),
        }
    }
}

impl DualTransponderSettings {
    /// Delay as a time offset (microsecond resolution), `None` when disabled.
    pub fn delay(&self) -> Option<TimeDelta> {
        if !self.enabled {
            return None;
        }
        Some(TimeDelta::microseconds(
            (self.delay_milliseconds * 1000.0).round() as i64,
        ))
    }
}

fn default_dual_enabled() -> bool {
    true
}

fn default_dual_delay_ms() -> f64 {
    50.0
}

/// Packet labels as configured (nesting checked by the validator)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default)]
    pub event: Option<String>,

    #[serde(default)]
    pub round: Option<String>,

    #[serde(default)]
    pub heat: Option<String>,
}

impl LabelConfig {
    /// Build wire labels; round/heat are dropped when their parent is missing.
    pub fn to_labels(&self) -> Option<EventLabel> {
        let event = non_empty(&self.event)?;
        let mut labels = EventLabel::new(event);
        if let Some(round) = non_empty(&self.round) {
            labels = labels.with_round(round);
            if let Some(heat) = non_empty(&self.heat) {
                labels = labels.with_heat(heat);
            }
        }
        Some(labels)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Skater configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkaterConfig {
    /// Lane number, 1..=10
    pub lane: u8,

    /// Average lap duration in seconds
    #[serde(default)]
    pub average_split_time: Option<f64>,

    /// Explicit lap durations in seconds
    #[serde(default)]
    pub times: Option<Vec<f64>>,
}

impl SkaterConfig {
    /// Pace source; explicit times win when both are present and non-empty.
    pub fn pace_source(&self) -> Option<PaceSource> {
        match (&self.times, self.average_split_time) {
            (Some(times), _) if !times.is_empty() => Some(PaceSource::Explicit(times.clone())),
            (_, Some(average)) => Some(PaceSource::Average(average)),
            _ => None,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for race result files
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// Raw packet capture file
    File,
    /// TCP stream to the timing listener
    Network,
}

impl RaceConfig {
    /// Lap target, if `race.laps` is a valid count
    pub fn lap_target(&self) -> Option<LapTarget> {
        LapTarget::from_laps(self.race.laps)
    }

    /// Build a fresh race from this configuration.
    ///
    /// Expects an already validated configuration; structural problems are
    /// reported rather than re-validated.
    pub fn build_race(&self, created_at: Timestamp) -> Result<Race, ContractError> {
        let target = self.lap_target().ok_or_else(|| {
            ContractError::config_validation(
                "race.laps",
                format!("invalid lap count {}", self.race.laps),
            )
        })?;

        let skaters = self
            .skaters
            .iter()
            .enumerate()
            .map(|(idx, cfg)| {
                let pace = cfg.pace_source().ok_or_else(|| {
                    ContractError::config_validation(
                        format!("skaters[{idx}]"),
                        "no pace source configured",
                    )
                })?;
                Ok(Skater::new(Lane::new(cfg.lane), pace))
            })
            .collect::<Result<Vec<_>, ContractError>>()?;

        Ok(Race::new(target, skaters, created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn sample_config() -> RaceConfig {
        RaceConfig {
            race: RaceSettings {
                laps: 4.5,
                tcp: TcpSettings::default(),
                dual_transponder: DualTransponderSettings::default(),
                labels: LabelConfig::default(),
                send_zero_packet: false,
                seed: None,
            },
            skaters: vec![
                SkaterConfig {
                    lane: 1,
                    average_split_time: Some(10.0),
                    times: None,
                },
                SkaterConfig {
                    lane: 2,
                    average_split_time: None,
                    times: Some(vec![8.0, 7.5, 7.9]),
                },
            ],
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn build_race_mirrors_config() {
        let race = sample_config().build_race(Local::now()).unwrap();
        assert_eq!(race.target, LapTarget::with_half_lap(4));
        assert_eq!(race.skaters.len(), 2);
        assert_eq!(race.skaters[0].lane, 1);
        assert_eq!(race.skaters[0].pace, PaceSource::Average(10.0));
        assert_eq!(
            race.skaters[1].pace,
            PaceSource::Explicit(vec![8.0, 7.5, 7.9])
        );
        assert!(race.skaters.iter().all(|s| s.current_lap == 0));
    }

    #[test]
    fn build_race_rejects_bad_laps() {
        let mut config = sample_config();
        config.race.laps = 4.2;
        let err = config.build_race(Local::now()).unwrap_err();
        assert!(err.to_string().contains("race.laps"));
    }

    #[test]
    fn defaults() {
        let settings = TcpSettings::default();
        assert_eq!(settings.address(), "localhost:2002");

        let dual = DualTransponderSettings::default();
        assert_eq!(dual.delay(), Some(TimeDelta::milliseconds(50)));

        let disabled = DualTransponderSettings {
            enabled: false,
            delay_milliseconds: 50.0,
        };
        assert_eq!(disabled.delay(), None);
    }

    #[test]
    fn labels_respect_nesting() {
        let labels = LabelConfig {
            event: None,
            round: Some("1".into()),
            heat: None,
        };
        assert!(labels.to_labels().is_none());

        let labels = LabelConfig {
            event: Some("500m".into()),
            round: Some("2".into()),
            heat: Some("4".into()),
        };
        assert_eq!(labels.to_labels().unwrap().fields(), vec!["500m", "2", "4"]);
    }
}
