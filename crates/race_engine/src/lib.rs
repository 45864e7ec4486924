//! # Race Engine
//!
//! Lap-duration synthesis and the lap-event scheduler.
//!
//! Responsibilities:
//! - Generate realistic lap durations (`LapTimeGenerator`)
//! - Turn per-skater durations into one time-ordered event list
//! - Drain that list against a wall clock, emitting `LapCompleted`
//!
//! ## Example
//!
//! ```ignore
//! use race_engine::{EventScheduler, LapTimeGenerator, SystemClock};
//!
//! let clock = Arc::new(SystemClock);
//! let generator = LapTimeGenerator::new(seed, clock.clone());
//! let scheduler = EventScheduler::new(generator, clock.clone());
//!
//! scheduler.set_callback(Arc::new(|lap| println!("{}", lap.record.label())));
//! scheduler.start_race(race)?;
//!
//! while !scheduler.all_skaters_finished() {
//!     scheduler.process_events(clock.now());
//!     std::thread::sleep(Duration::from_millis(50));
//! }
//! scheduler.process_all_remaining();
//! ```

mod clock;
mod generator;
mod scheduler;

pub use clock::{ManualClock, SystemClock};
pub use generator::{LapTimeGenerator, MIN_LAP_SECS};
pub use scheduler::{EventScheduler, ScheduledEvent, SchedulerPhase};

pub use contracts::{Clock, LapCompleted, LapCompletedCallback, Race, Timestamp};
