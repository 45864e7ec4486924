//! # Contracts
//!
//! Interface contracts shared by every crate of the lap-timing synthesizer:
//! race model, timing packets, configuration and the sink/clock seams.
//! Business crates depend on this crate only, never the other way round.
//!
//! ## Time Model
//! - Wall time is `chrono::DateTime<Local>` (`Timestamp`); the listener
//!   protocol carries local `HH:MM:SS.mmm`
//! - Lap durations are `f64` seconds

mod clock;
mod config;
mod error;
mod events;
mod lane;
mod packet;
mod race;
mod sink;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use lane::{Lane, MAX_LANE, MIN_LANE};
pub use packet::*;
pub use race::*;
pub use sink::*;
