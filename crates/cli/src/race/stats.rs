//! Session statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;

use super::RaceOutcome;

/// Statistics over every race of one `run` session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Races started
    pub races_run: u32,

    /// Races in which every skater finished
    pub races_completed: u32,

    /// Lap events released across all races
    pub laps_released: u64,

    /// Results files written
    pub results_files: Vec<String>,

    /// Wall time of the whole session
    pub duration: Duration,

    /// Final per-sink dispatch counters
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl SessionStats {
    pub fn record_race(&mut self, outcome: &RaceOutcome) {
        self.races_run += 1;
        if outcome.race.finished {
            self.races_completed += 1;
        }
        self.laps_released += outcome
            .race
            .skaters
            .iter()
            .map(|s| s.laps().len() as u64)
            .sum::<u64>();
    }

    /// Successful writes summed over all sinks
    pub fn packets_sent(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.write_count).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Session Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!(
            "   ├─ Races: {} ({} completed)",
            self.races_run, self.races_completed
        );
        println!("   ├─ Laps released: {}", self.laps_released);
        println!("   └─ Results files: {}", self.results_files.len());

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (i, (name, metrics)) in self.sinks.iter().enumerate() {
                let prefix = if i + 1 == self.sinks.len() { "└─" } else { "├─" };
                println!("   {prefix} {name}: {metrics}");
            }
        }

        println!();
    }
}
