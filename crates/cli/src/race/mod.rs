//! Race session module.

mod report;
mod runner;
mod stats;

pub use runner::{RaceOutcome, RaceRunner, RunnerConfig};
pub use stats::SessionStats;
