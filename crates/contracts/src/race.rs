//! Race model - Race, Skater, LapRecord
//!
//! Plain entities shared by the scheduler and every consumer of lap events.
//! Lanes and pace sources are fixed once a race is built; lap records are
//! append-only.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Lane, Timestamp};

/// Race distance in laps: a whole count, optionally plus one leading half lap.
///
/// A half-lap race (e.g. 4.5) is run as one short opening lap followed by the
/// whole-lap count, so it produces `whole_laps + 1` lap-completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LapTarget {
    whole_laps: u32,
    half_lap: bool,
}

impl LapTarget {
    /// Whole-lap race.
    pub const fn whole(laps: u32) -> Self {
        Self {
            whole_laps: laps,
            half_lap: false,
        }
    }

    /// Race of `laps` whole laps plus a leading half lap.
    pub const fn with_half_lap(laps: u32) -> Self {
        Self {
            whole_laps: laps,
            half_lap: true,
        }
    }

    /// Interpret a configured lap count.
    ///
    /// Returns `None` unless `laps` is finite, positive and either a whole
    /// number or a whole number plus one half.
    pub fn from_laps(laps: f64) -> Option<Self> {
        if !laps.is_finite() || laps <= 0.0 {
            return None;
        }

        let doubled = laps * 2.0;
        if doubled.fract() != 0.0 || doubled > f64::from(u32::MAX) {
            return None;
        }

        let halves = doubled as u64;
        let whole_laps = u32::try_from(halves / 2).ok()?;
        Some(Self {
            whole_laps,
            half_lap: halves % 2 == 1,
        })
    }

    /// Lap count as configured (4.5, 9, ...).
    pub fn laps(self) -> f64 {
        f64::from(self.whole_laps) + if self.half_lap { 0.5 } else { 0.0 }
    }

    /// Number of whole laps.
    pub fn whole_laps(self) -> u32 {
        self.whole_laps
    }

    /// `laps mod 1 != 0`
    pub fn has_half_lap(self) -> bool {
        self.half_lap
    }

    /// Number of lap-completion events one skater produces.
    pub fn event_count(self) -> u32 {
        self.whole_laps + u32::from(self.half_lap)
    }
}

impl fmt::Display for LapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.half_lap {
            write!(f, "{}.5", self.whole_laps)
        } else {
            write!(f, "{}", self.whole_laps)
        }
    }
}

/// Where a skater's lap durations come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceSource {
    /// Average lap duration in seconds; laps vary around it.
    Average(f64),
    /// Exact lap durations in seconds, replayed in order.
    Explicit(Vec<f64>),
}

/// One completed lap. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub lane: Lane,
    pub lap_number: u32,
    /// Lap duration in seconds (> 0)
    pub duration_secs: f64,
    /// Wall time the lap was observed
    pub timestamp: Timestamp,
    pub is_half_lap: bool,
}

impl LapRecord {
    /// Human-readable lap label ("Half-lap" / "Lap N").
    pub fn label(&self) -> String {
        if self.is_half_lap {
            "Half-lap".to_string()
        } else {
            format!("Lap {}", self.lap_number)
        }
    }
}

/// A skater taking part in a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skater {
    pub lane: Lane,
    pub pace: PaceSource,
    /// Next lap number to be completed; starts at 0
    pub current_lap: u32,
    laps: Vec<LapRecord>,
    pub finished: bool,
    pub finish_time: Option<Timestamp>,
}

impl Skater {
    pub fn new(lane: Lane, pace: PaceSource) -> Self {
        Self {
            lane,
            pace,
            current_lap: 0,
            laps: Vec::new(),
            finished: false,
            finish_time: None,
        }
    }

    /// Completed laps in completion order.
    pub fn laps(&self) -> &[LapRecord] {
        &self.laps
    }

    /// Append a completed lap.
    pub fn record_lap(&mut self, record: LapRecord) {
        self.laps.push(record);
    }

    /// Sum of all completed lap durations (seconds).
    pub fn total_elapsed_secs(&self) -> f64 {
        self.laps.iter().map(|lap| lap.duration_secs).sum()
    }

    pub fn uses_explicit_times(&self) -> bool {
        matches!(self.pace, PaceSource::Explicit(_))
    }
}

/// A race run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    #[serde(with = "lap_target_serde")]
    pub target: LapTarget,
    pub skaters: Vec<Skater>,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    pub finished: bool,
}

impl Race {
    pub fn new(target: LapTarget, skaters: Vec<Skater>, start_time: Timestamp) -> Self {
        Self {
            target,
            skaters,
            start_time,
            end_time: None,
            finished: false,
        }
    }

    pub fn has_half_lap(&self) -> bool {
        self.target.has_half_lap()
    }

    /// A skater is finished once its lap counter moved strictly past the
    /// last lap-completion event of the race.
    pub fn is_skater_finished(&self, skater: &Skater) -> bool {
        skater.current_lap > self.target.event_count()
    }

    pub fn all_skaters_finished(&self) -> bool {
        self.skaters.iter().all(|s| self.is_skater_finished(s))
    }

    /// Seconds between start and end, if the race has ended.
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time.map(|end| seconds_between(self.start_time, end))
    }

    /// Finished skaters ordered by finish time.
    pub fn standings(&self) -> Vec<&Skater> {
        let mut finished: Vec<&Skater> = self
            .skaters
            .iter()
            .filter(|s| s.finished && s.finish_time.is_some())
            .collect();
        finished.sort_by_key(|s| s.finish_time);
        finished
    }
}

/// Signed seconds from `from` to `to`, millisecond resolution.
pub fn seconds_between(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

mod lap_target_serde {
    use super::LapTarget;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(target: &LapTarget, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(target.laps())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LapTarget, D::Error> {
        let laps = f64::deserialize(deserializer)?;
        LapTarget::from_laps(laps)
            .ok_or_else(|| D::Error::custom(format!("invalid lap count {laps}")))
    }
}
