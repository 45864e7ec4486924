//! Lap-duration synthesis.
//!
//! Two modes:
//! - explicit: replay the configured durations, repeating the last one
//! - average pace: vary around the average with a slow-skewed piecewise
//!   distribution, a per-call performance trend, rare extreme laps and
//!   millisecond jitter
//!
//! Every average-pace call seeds its own `StdRng`, so the generator can be
//! shared across threads without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::{Clock, ContractError, Lane, PaceSource, Skater};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Shortest lap the generator ever returns (seconds)
pub const MIN_LAP_SECS: f64 = 1.0;

const HALF_LAP_FACTOR: f64 = 0.75;
const FIRST_LAP_FACTOR: f64 = 1.25;

const LANE_PRIME: u64 = 7919;
const LAP_PRIME: u64 = 65537;
const CALL_PRIME: u64 = 9973;

const EXTREME_LAP_PROBABILITY: f64 = 0.05;
const LANE_PARITY_BIAS: f64 = 0.005;

/// `(cumulative probability, low, high)` in seconds
type Bucket = (f64, f64, f64);

const PRIMARY_BUCKETS: [Bucket; 5] = [
    (0.10, -1.0, 0.0),
    (0.30, -0.5, 0.0),
    (0.60, -0.5, 0.5),
    (0.85, 0.5, 2.0),
    (1.00, 2.0, 3.0),
];

/// great / bad / exceptional / terrible
const EXTREME_BUCKETS: [Bucket; 4] = [
    (0.30, -1.5, 0.0),
    (0.60, 1.5, 4.0),
    (0.80, -2.5, -1.5),
    (1.00, 4.0, 6.0),
];

/// Lap-duration generator
///
/// Owns the call counter mixed into every per-call seed; two generators
/// never share it.
pub struct LapTimeGenerator {
    base_seed: u64,
    calls: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl LapTimeGenerator {
    pub fn new(base_seed: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            base_seed,
            calls: AtomicU64::new(0),
            clock,
        }
    }

    /// Number of average-pace draws so far
    pub fn draws(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Duration of `lap_number` (1-based) for `skater`, in seconds.
    ///
    /// # Errors
    /// `InvalidState` when the skater is in explicit mode with an empty list.
    pub fn generate(
        &self,
        skater: &Skater,
        lap_number: u32,
        is_half_lap: bool,
    ) -> Result<f64, ContractError> {
        let duration = match &skater.pace {
            PaceSource::Explicit(times) => explicit_time(skater.lane, times, lap_number)?,
            PaceSource::Average(average) => {
                self.varied_time(skater.lane, *average, lap_number, is_half_lap)
            }
        };

        trace!(
            lane = %skater.lane,
            lap = lap_number,
            half_lap = is_half_lap,
            duration,
            "lap time generated"
        );
        Ok(duration)
    }

    fn varied_time(&self, lane: Lane, average: f64, lap_number: u32, is_half_lap: bool) -> f64 {
        let base = average * position_factor(lap_number, is_half_lap);
        let mut rng = StdRng::seed_from_u64(self.derive_seed(lane, lap_number));

        let primary = draw(&mut rng, &PRIMARY_BUCKETS);
        let trend = performance_trend(&mut rng, lane);

        let extreme = (rng.random::<f64>() < EXTREME_LAP_PROBABILITY)
            .then(|| draw(&mut rng, &EXTREME_BUCKETS));

        let jitter = f64::from(rng.random_range(0..1000u32)) / 1000.0;

        lap_time(base, primary, trend, extreme, jitter)
    }

    fn derive_seed(&self, lane: Lane, lap_number: u32) -> u64 {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let time = self.clock.now().timestamp_micros() as u64;

        time ^ u64::from(lane.get()).wrapping_mul(LANE_PRIME)
            ^ u64::from(lap_number).wrapping_mul(LAP_PRIME)
            ^ self.base_seed
            ^ call.wrapping_mul(CALL_PRIME)
    }
}

impl std::fmt::Debug for LapTimeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LapTimeGenerator")
            .field("base_seed", &self.base_seed)
            .field("draws", &self.draws())
            .finish()
    }
}

/// Lap 1 of a half-lap race is the half lap and takes `times[0]`; every lap
/// N takes `times[N - 1]`, so full laps after a half lap are offset by one.
fn explicit_time(lane: Lane, times: &[f64], lap_number: u32) -> Result<f64, ContractError> {
    let last = times.len().checked_sub(1).ok_or_else(|| {
        ContractError::invalid_state(format!("lane {lane} has no explicit lap times"))
    })?;
    let index = (lap_number.saturating_sub(1) as usize).min(last);
    Ok(times[index])
}

/// Combine the drawn components into a lap time.
///
/// An extreme lap replaces the trend-scaled time outright, so neither the
/// trend nor the lane bias applies to it.
fn lap_time(base: f64, primary: f64, trend: f64, extreme: Option<f64>, jitter: f64) -> f64 {
    let varied = match extreme {
        Some(variation) => base + variation,
        None => (base + primary) * trend,
    };
    (varied + jitter).max(MIN_LAP_SECS)
}

fn position_factor(lap_number: u32, is_half_lap: bool) -> f64 {
    if is_half_lap {
        HALF_LAP_FACTOR
    } else if lap_number == 1 {
        FIRST_LAP_FACTOR
    } else {
        1.0
    }
}

fn performance_trend(rng: &mut StdRng, lane: Lane) -> f64 {
    let trend = 0.98 + rng.random::<f64>() * 0.04;
    if lane.is_even() {
        trend + LANE_PARITY_BIAS
    } else {
        trend - LANE_PARITY_BIAS
    }
}

fn draw(rng: &mut StdRng, buckets: &[Bucket]) -> f64 {
    let p = rng.random::<f64>();
    let (_, low, high) = buckets
        .iter()
        .copied()
        .find(|(cumulative, _, _)| p < *cumulative)
        .unwrap_or(buckets[buckets.len() - 1]);
    low + rng.random::<f64>() * (high - low)
}
