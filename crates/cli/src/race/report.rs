//! Race report: console lap lines, final standings and the results file.

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{LapCompleted, Race, Timestamp};
use observability::{RaceMetricsAggregator, RaceSummary};

/// Results file name timestamp (`race-results-20261018-140322.txt`)
const FILE_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lines produced by one race, in release order.
#[derive(Debug, Clone)]
pub struct RaceReport {
    race_start: Timestamp,
    lines: Vec<String>,
    lap_stats: RaceMetricsAggregator,
}

impl RaceReport {
    pub fn new(race_start: Timestamp) -> Self {
        Self {
            race_start,
            lines: Vec::new(),
            lap_stats: RaceMetricsAggregator::new(),
        }
    }

    /// Record a released lap and return the console lines it produced.
    pub fn record_lap(&mut self, lap: &LapCompleted) -> Vec<String> {
        self.lap_stats.update(lap);

        let mut produced = vec![lap_line(lap)];
        if lap.skater_finished {
            let finished_at = lap.skater.finish_time.unwrap_or(lap.record.timestamp);
            produced.push(format!(
                "[+{:.1}s] Lane {} - FINISHED!",
                elapsed_secs(self.race_start, finished_at),
                lap.record.lane
            ));
        }

        self.lines.extend(produced.iter().cloned());
        produced
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn lap_summary(&self) -> RaceSummary {
        self.lap_stats.summary()
    }

    /// Write `race-results-<start>.txt` into `dir`, creating it if needed.
    pub fn write_results(&self, race: &Race, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let file_name = format!(
            "race-results-{}.txt",
            race.start_time.format(FILE_STAMP_FORMAT)
        );
        let path = dir.join(file_name);
        fs::write(&path, self.render(race))?;
        Ok(path)
    }

    fn render(&self, race: &Race) -> String {
        let mut out = vec![
            "=== RACE RESULTS ===".to_string(),
            format!("Race Date: {}", race.start_time.format(DATE_FORMAT)),
            format!("Total Laps: {}", race.target),
            format!("Number of Skaters: {}", race.skaters.len()),
            duration_line(race),
            String::new(),
            "=== LAP TIMES ===".to_string(),
            String::new(),
        ];
        out.extend(self.lines.iter().cloned());
        out.push(String::new());
        out.push("=== FINAL STANDINGS ===".to_string());
        out.extend(standings(race));

        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}

/// `[+E.Es] Lane L - Lap N: D.DDDDs (Total: T.TTTTs)`
pub fn lap_line(lap: &LapCompleted) -> String {
    format!(
        "[+{:.1}s] Lane {} - {}: {:.4}s (Total: {:.4}s)",
        lap.elapsed_secs(),
        lap.record.lane,
        lap.record.label(),
        lap.record.duration_secs,
        lap.skater.total_elapsed_secs()
    )
}

/// Finished skaters by finish time: `N. Lane L - T.TTTTs`
pub fn standings(race: &Race) -> Vec<String> {
    race.standings()
        .into_iter()
        .enumerate()
        .filter_map(|(i, skater)| {
            let finished_at = skater.finish_time?;
            Some(format!(
                "{}. Lane {} - {:.4}s",
                i + 1,
                skater.lane,
                elapsed_secs(race.start_time, finished_at)
            ))
        })
        .collect()
}

fn duration_line(race: &Race) -> String {
    let secs = race
        .end_time
        .map(|end| elapsed_secs(race.start_time, end))
        .unwrap_or_default();

    if race.finished {
        format!("Race Duration: {secs:.1} seconds")
    } else {
        format!("Race Duration: {secs:.1} seconds (stopped early)")
    }
}

/// Microsecond-resolution seconds between two wall times.
fn elapsed_secs(from: Timestamp, to: Timestamp) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// Print the end-of-race block to the console.
pub fn print_final_results(race: &Race, report: &RaceReport) {
    println!();
    if race.finished {
        println!("=== RACE FINISHED ===");
    } else {
        println!("=== RACE STOPPED ===");
    }
    if let Some(end) = race.end_time {
        println!(
            "Total race time: {:.1} seconds",
            elapsed_secs(race.start_time, end)
        );
    }
    println!();

    println!("=== FINAL RACE RESULTS ===");
    println!();
    println!("Final Standings:");
    for line in standings(race) {
        println!("  {line}");
    }
    println!();
    println!("Number of skaters: {}", race.skaters.len());
    println!("Race distance: {} laps", race.target);
    println!();
    print!("{}", report.lap_summary());
}
