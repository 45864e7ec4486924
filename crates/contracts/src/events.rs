//! LapCompleted - Scheduler output
//!
//! Notification emitted once per released lap event.

use std::sync::Arc;

use crate::{LapRecord, Skater, Timestamp};

/// A lap that has just been released by the scheduler.
#[derive(Debug, Clone)]
pub struct LapCompleted {
    /// The new record (already appended to the skater)
    pub record: LapRecord,

    /// Skater state right after the record was appended
    pub skater: Skater,

    /// Whether this lap finished the skater's race
    pub skater_finished: bool,

    /// Start time of the race the lap belongs to
    pub race_start: Timestamp,
}

impl LapCompleted {
    /// Seconds from race start to the observed lap time.
    pub fn elapsed_secs(&self) -> f64 {
        crate::seconds_between(self.race_start, self.record.timestamp)
    }
}

/// Lap notification callback type
///
/// Invoked synchronously, in release order, outside the scheduler's lock.
/// Handlers that do slow work should hand the event off (e.g. to a channel).
pub type LapCompletedCallback = Arc<dyn Fn(&LapCompleted) + Send + Sync>;
