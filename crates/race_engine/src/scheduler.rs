//! Lap-event scheduler.
//!
//! `start_race` samples the clock once, generates every lap duration up
//! front and lays the laps out as cumulative offsets from that instant.
//! Draining releases due events one by one: each release is a short
//! critical section, and the callback runs after the lock is dropped.
//!
//! Drains are serialized with each other but not with `start_race`. A race
//! loaded mid-drain bumps the schedule generation, and the running drain
//! stops at its next release. Callbacks may call `start_race`; calling
//! `process_events` or `process_all_remaining` from a callback deadlocks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::TimeDelta;
use contracts::{
    Clock, ContractError, Lane, LapCompleted, LapCompletedCallback, LapRecord, Race, Timestamp,
};
use tracing::{debug, info, instrument};

use crate::LapTimeGenerator;

/// Scheduler lifecycle for the current race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// No race loaded
    Idle,
    /// Schedule built, nothing released yet
    Built,
    /// At least one event released
    Draining,
    /// Force-drained; nothing left
    Drained,
}

/// One lap completion waiting to be released.
///
/// Events are never removed, only marked processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    /// Index of the skater in `Race::skaters`
    pub skater_index: usize,
    pub lane: Lane,
    pub lap_number: u32,
    pub is_half_lap: bool,
    /// Pre-generated lap duration (seconds)
    pub duration_secs: f64,
    pub scheduled_time: Timestamp,
    pub processed: bool,
}

struct SchedulerState {
    phase: SchedulerPhase,
    race: Option<Race>,
    /// Sorted by scheduled time; processed events form a prefix
    events: Vec<ScheduledEvent>,
    next: usize,
    force_drained: bool,
    /// Bumped by every `start_race`
    generation: u64,
}

impl SchedulerState {
    fn idle() -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            race: None,
            events: Vec::new(),
            next: 0,
            force_drained: false,
            generation: 0,
        }
    }

    /// Release the next event if `due` accepts it.
    fn release_next(
        &mut self,
        generation: u64,
        observed_at: Timestamp,
        due: impl Fn(&ScheduledEvent) -> bool,
    ) -> Option<LapCompleted> {
        if self.generation != generation {
            return None;
        }
        let race = self.race.as_mut()?;
        let event = self.events.get_mut(self.next)?;
        if event.processed || !due(event) {
            return None;
        }

        event.processed = true;
        self.next += 1;

        let record = LapRecord {
            lane: event.lane,
            lap_number: event.lap_number,
            duration_secs: event.duration_secs,
            timestamp: observed_at,
            is_half_lap: event.is_half_lap,
        };

        let event_count = race.target.event_count();
        let skater = race.skaters.get_mut(event.skater_index)?;
        skater.record_lap(record.clone());
        skater.current_lap = event.lap_number + 1;

        let skater_finished = skater.current_lap > event_count;
        if skater_finished && !skater.finished {
            skater.finished = true;
            skater.finish_time = Some(observed_at);
        }

        if self.phase == SchedulerPhase::Built {
            self.phase = SchedulerPhase::Draining;
        }

        Some(LapCompleted {
            record,
            skater: skater.clone(),
            skater_finished,
            race_start: race.start_time,
        })
    }

    fn remaining(&self) -> usize {
        self.events.len() - self.next
    }
}

/// Event scheduler
///
/// Drives one race at a time. All methods take `&self`; share it behind an
/// `Arc` between the polling loop and observers.
pub struct EventScheduler {
    generator: LapTimeGenerator,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
    /// Serializes whole drains so concurrent callers cannot interleave
    /// releases out of order
    drain: Mutex<()>,
    callback: Mutex<Option<LapCompletedCallback>>,
}

impl EventScheduler {
    pub fn new(generator: LapTimeGenerator, clock: Arc<dyn Clock>) -> Self {
        Self {
            generator,
            clock,
            state: Mutex::new(SchedulerState::idle()),
            drain: Mutex::new(()),
            callback: Mutex::new(None),
        }
    }

    /// Register the lap-completed callback, replacing any previous one.
    pub fn set_callback(&self, callback: LapCompletedCallback) {
        *lock(&self.callback) = Some(callback);
    }

    pub fn clear_callback(&self) {
        *lock(&self.callback) = None;
    }

    /// Build the schedule for `race`, replacing any race already loaded.
    ///
    /// The race start time is the single clock sample taken here.
    ///
    /// # Errors
    /// Propagates generator failures (empty explicit time list); the
    /// previous state is kept in that case.
    #[instrument(
        name = "scheduler_start_race",
        skip(self, race),
        fields(laps = %race.target, skaters = race.skaters.len())
    )]
    pub fn start_race(&self, mut race: Race) -> Result<(), ContractError> {
        let now = self.clock.now();
        let events = self.build_schedule(&race, now)?;

        race.start_time = now;
        race.end_time = None;
        race.finished = false;

        let mut state = lock(&self.state);
        if state.phase != SchedulerPhase::Idle {
            debug!(previous = ?state.phase, "replacing loaded race");
        }
        info!(events = events.len(), "race schedule built");

        let generation = state.generation.wrapping_add(1);
        *state = SchedulerState {
            phase: SchedulerPhase::Built,
            race: Some(race),
            events,
            next: 0,
            force_drained: false,
            generation,
        };
        Ok(())
    }

    fn build_schedule(
        &self,
        race: &Race,
        now: Timestamp,
    ) -> Result<Vec<ScheduledEvent>, ContractError> {
        let event_count = race.target.event_count();
        let has_half_lap = race.has_half_lap();
        let mut events = Vec::with_capacity(race.skaters.len() * event_count as usize);

        for (skater_index, skater) in race.skaters.iter().enumerate() {
            let mut elapsed = 0.0;
            for lap_number in 1..=event_count {
                let is_half_lap = has_half_lap && lap_number == 1;
                let duration_secs = self.generator.generate(skater, lap_number, is_half_lap)?;
                elapsed += duration_secs;

                events.push(ScheduledEvent {
                    skater_index,
                    lane: skater.lane,
                    lap_number,
                    is_half_lap,
                    duration_secs,
                    scheduled_time: now + secs_to_delta(elapsed),
                    processed: false,
                });
            }
        }

        // Stable: ties keep skater order, then lap order
        events.sort_by_key(|e| e.scheduled_time);
        Ok(events)
    }

    /// Release every unprocessed event scheduled at or before `current_time`.
    ///
    /// Returns the number of events released.
    pub fn process_events(&self, current_time: Timestamp) -> usize {
        let _drain = lock(&self.drain);
        self.drain_where(current_time, |event| event.scheduled_time <= current_time).0
    }

    /// Release every remaining event now, whatever its scheduled time.
    ///
    /// Marks the race finished when all skaters are.
    pub fn process_all_remaining(&self) -> usize {
        let _drain = lock(&self.drain);
        let now = self.clock.now();
        let (released, generation) = self.drain_where(now, |_| true);

        let mut state = lock(&self.state);
        // A race loaded during the drain keeps its fresh schedule
        if state.race.is_none() || state.generation != generation {
            return released;
        }
        state.force_drained = true;
        state.phase = SchedulerPhase::Drained;

        if let Some(race) = state.race.as_mut() {
            if race.all_skaters_finished() && !race.finished {
                race.finished = true;
                race.end_time = Some(now);
                observability::record_race_completed();
                info!(
                    duration_secs = race.duration_secs().unwrap_or_default(),
                    "race finished"
                );
            }
        }
        released
    }

    /// Release events of the current schedule while `due` accepts them.
    ///
    /// Callers hold the drain guard. Returns the release count and the
    /// schedule generation drained.
    fn drain_where(
        &self,
        observed_at: Timestamp,
        due: impl Fn(&ScheduledEvent) -> bool,
    ) -> (usize, u64) {
        let callback = lock(&self.callback).clone();
        let generation = lock(&self.state).generation;

        let mut released = 0;
        loop {
            let Some(lap) = lock(&self.state).release_next(generation, observed_at, &due) else {
                break;
            };
            released += 1;

            debug!(
                lane = %lap.record.lane,
                lap = lap.record.lap_number,
                duration = lap.record.duration_secs,
                finished = lap.skater_finished,
                "lap released"
            );
            observability::record_lap_completed(&lap);

            if let Some(callback) = &callback {
                callback(&lap);
            }
        }

        if released > 0 {
            observability::record_release_batch(released);
        }
        (released, generation)
    }

    pub fn phase(&self) -> SchedulerPhase {
        lock(&self.state).phase
    }

    /// All skaters finished and the race force-drained.
    pub fn is_race_finished(&self) -> bool {
        let state = lock(&self.state);
        state.force_drained
            && state
                .race
                .as_ref()
                .is_some_and(|race| race.all_skaters_finished())
    }

    /// All skaters finished; force-drain may still be pending.
    pub fn all_skaters_finished(&self) -> bool {
        lock(&self.state)
            .race
            .as_ref()
            .is_some_and(|race| race.all_skaters_finished())
    }

    pub fn is_skater_finished(&self, lane: Lane) -> bool {
        let state = lock(&self.state);
        state.race.as_ref().is_some_and(|race| {
            race.skaters
                .iter()
                .find(|s| s.lane == lane)
                .is_some_and(|s| race.is_skater_finished(s))
        })
    }

    /// Copy of the loaded race.
    pub fn race_snapshot(&self) -> Option<Race> {
        lock(&self.state).race.clone()
    }

    /// Copy of the full schedule, processed events included.
    pub fn events(&self) -> Vec<ScheduledEvent> {
        lock(&self.state).events.clone()
    }

    pub fn remaining_events(&self) -> usize {
        lock(&self.state).remaining()
    }

    /// Scheduled time of the next unreleased event.
    pub fn next_event_time(&self) -> Option<Timestamp> {
        let state = lock(&self.state);
        state.events.get(state.next).map(|e| e.scheduled_time)
    }
}

impl std::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("EventScheduler")
            .field("phase", &state.phase)
            .field("events", &state.events.len())
            .field("remaining", &state.remaining())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn secs_to_delta(secs: f64) -> TimeDelta {
    TimeDelta::microseconds((secs * 1_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use chrono::Local;
    use contracts::{LapTarget, PaceSource, Skater};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        clock: Arc<ManualClock>,
        scheduler: EventScheduler,
        laps: Arc<Mutex<Vec<LapCompleted>>>,
    }

    fn fixture(seed: u64) -> Fixture {
        let clock = Arc::new(ManualClock::new(Local::now()));
        let generator = LapTimeGenerator::new(seed, clock.clone());
        let scheduler = EventScheduler::new(generator, clock.clone());

        let laps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&laps);
        scheduler.set_callback(Arc::new(move |lap: &LapCompleted| {
            sink.lock().unwrap().push(lap.clone());
        }));

        Fixture {
            clock,
            scheduler,
            laps,
        }
    }

    fn race(target: LapTarget, skaters: Vec<Skater>) -> Race {
        Race::new(target, skaters, Local::now())
    }

    fn explicit(lane: u8, times: &[f64]) -> Skater {
        Skater::new(Lane::new(lane), PaceSource::Explicit(times.to_vec()))
    }

    fn average(lane: u8, secs: f64) -> Skater {
        Skater::new(Lane::new(lane), PaceSource::Average(secs))
    }

    #[test]
    fn test_half_lap_race_single_skater() {
        let f = fixture(1234);
        f.scheduler
            .start_race(race(LapTarget::with_half_lap(4), vec![average(1, 10.0)]))
            .unwrap();

        let events = f.scheduler.events();
        assert_eq!(events.len(), 5);
        assert!(events[0].is_half_lap);
        assert!(events[1..].iter().all(|e| !e.is_half_lap));

        f.clock.advance(TimeDelta::seconds(3600));
        f.scheduler.process_events(f.clock.now());
        f.scheduler.process_all_remaining();

        let snapshot = f.scheduler.race_snapshot().unwrap();
        assert_eq!(snapshot.skaters[0].current_lap, 6);
        assert!(snapshot.skaters[0].finished);
        assert!(f.scheduler.is_skater_finished(Lane::new(1)));
        assert!(f.scheduler.is_race_finished());
        assert!(snapshot.finished);
        assert_eq!(f.laps.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_schedule_is_cumulative() {
        let f = fixture(0);
        let start = f.clock.now();
        f.scheduler
            .start_race(race(LapTarget::whole(3), vec![explicit(1, &[8.0, 7.5, 7.9])]))
            .unwrap();

        let times: Vec<_> = f.scheduler.events().iter().map(|e| e.scheduled_time).collect();
        assert_eq!(
            times,
            vec![
                start + TimeDelta::milliseconds(8000),
                start + TimeDelta::milliseconds(15500),
                start + TimeDelta::milliseconds(23400),
            ]
        );
        assert_eq!(f.scheduler.race_snapshot().unwrap().start_time, start);
    }

    #[test]
    fn test_events_globally_ordered_ties_keep_skater_order() {
        let f = fixture(0);
        f.scheduler
            .start_race(race(
                LapTarget::whole(2),
                vec![explicit(3, &[9.0, 9.0]), explicit(1, &[4.5, 4.5, 9.0])],
            ))
            .unwrap();

        let order: Vec<(u8, u32)> = f
            .scheduler
            .events()
            .iter()
            .map(|e| (e.lane.get(), e.lap_number))
            .collect();
        // lane 1 lap 2 and lane 3 lap 1 both land at 9 s
        assert_eq!(order, vec![(1, 1), (3, 1), (1, 2), (3, 2)]);
    }

    #[test]
    fn test_process_events_releases_only_due() {
        let f = fixture(0);
        let start = f.clock.now();
        f.scheduler
            .start_race(race(
                LapTarget::whole(3),
                vec![explicit(1, &[10.0]), explicit(2, &[12.0])],
            ))
            .unwrap();

        assert_eq!(f.scheduler.process_events(start + TimeDelta::seconds(9)), 0);
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Built);

        // exactly at the scheduled time counts as due
        assert_eq!(f.scheduler.process_events(start + TimeDelta::seconds(10)), 1);
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Draining);

        assert_eq!(f.scheduler.process_events(start + TimeDelta::seconds(24)), 3);
        assert_eq!(f.scheduler.remaining_events(), 2);

        // replaying an old poll releases nothing again
        assert_eq!(f.scheduler.process_events(start + TimeDelta::seconds(24)), 0);

        let laps = f.laps.lock().unwrap();
        let released: Vec<(u8, u32)> = laps
            .iter()
            .map(|l| (l.record.lane.get(), l.record.lap_number))
            .collect();
        assert_eq!(released, vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
        assert_eq!(laps[3].record.timestamp, start + TimeDelta::seconds(24));
    }

    #[test]
    fn test_release_order_non_decreasing() {
        let f = fixture(77);
        let skaters = (1..=6).map(|lane| average(lane, 9.0 + lane as f64 * 0.1)).collect();
        f.scheduler
            .start_race(race(LapTarget::with_half_lap(8), skaters))
            .unwrap();

        let schedule = f.scheduler.events();
        let mut now = f.clock.now();
        while f.scheduler.remaining_events() > 0 {
            now += TimeDelta::milliseconds(730);
            f.scheduler.process_events(now);
        }

        let laps = f.laps.lock().unwrap();
        assert_eq!(laps.len(), schedule.len());

        let mut previous = None;
        for lap in laps.iter() {
            let event = schedule
                .iter()
                .find(|e| e.lane == lap.record.lane && e.lap_number == lap.record.lap_number)
                .unwrap();
            assert!(event.scheduled_time <= lap.record.timestamp);
            if let Some(prev) = previous {
                assert!(prev <= event.scheduled_time);
            }
            previous = Some(event.scheduled_time);
        }
    }

    #[test]
    fn test_force_drain_releases_everything() {
        let f = fixture(0);
        f.scheduler
            .start_race(race(
                LapTarget::whole(4),
                vec![explicit(1, &[30.0]), explicit(2, &[31.0])],
            ))
            .unwrap();

        f.clock.advance(TimeDelta::seconds(1));
        let drained_at = f.clock.now();
        assert_eq!(f.scheduler.process_all_remaining(), 8);
        assert_eq!(f.scheduler.remaining_events(), 0);
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Drained);
        assert!(f.scheduler.events().iter().all(|e| e.processed));
        assert!(f
            .laps
            .lock()
            .unwrap()
            .iter()
            .all(|l| l.record.timestamp == drained_at));
        assert!(f.scheduler.is_race_finished());
    }

    #[test]
    fn test_race_not_finished_until_force_drained() {
        let f = fixture(0);
        f.scheduler
            .start_race(race(LapTarget::whole(1), vec![explicit(1, &[5.0])]))
            .unwrap();

        f.clock.advance(TimeDelta::seconds(10));
        f.scheduler.process_events(f.clock.now());
        assert!(f.scheduler.all_skaters_finished());
        assert!(!f.scheduler.is_race_finished());

        assert_eq!(f.scheduler.process_all_remaining(), 0);
        assert!(f.scheduler.is_race_finished());
    }

    #[test]
    fn test_skater_progress_and_records() {
        let f = fixture(0);
        let start = f.clock.now();
        f.scheduler
            .start_race(race(
                LapTarget::with_half_lap(2),
                vec![explicit(5, &[4.0, 8.0, 7.5])],
            ))
            .unwrap();

        f.scheduler.process_events(start + TimeDelta::seconds(5));
        let snapshot = f.scheduler.race_snapshot().unwrap();
        let skater = &snapshot.skaters[0];
        assert_eq!(skater.current_lap, 2);
        assert!(!skater.finished);
        assert_eq!(skater.laps().len(), 1);
        assert!(skater.laps()[0].is_half_lap);
        assert_eq!(skater.laps()[0].duration_secs, 4.0);

        f.scheduler.process_events(start + TimeDelta::seconds(20));
        let laps = f.laps.lock().unwrap();
        let last = laps.last().unwrap();
        assert_eq!(last.record.lap_number, 3);
        assert_eq!(last.record.duration_secs, 7.5);
        assert!(last.skater_finished);
        assert_eq!(last.skater.current_lap, 4);
        assert_eq!(last.skater.finish_time, Some(start + TimeDelta::seconds(20)));
        assert_eq!(last.skater.total_elapsed_secs(), 19.5);
    }

    #[test]
    fn test_callback_runs_outside_lock() {
        let clock = Arc::new(ManualClock::new(Local::now()));
        let scheduler = Arc::new(EventScheduler::new(
            LapTimeGenerator::new(0, clock.clone()),
            clock.clone(),
        ));

        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::downgrade(&scheduler);
        let counter = Arc::clone(&seen);
        scheduler.set_callback(Arc::new(move |lap: &LapCompleted| {
            // querying from inside the callback must not deadlock
            if let Some(scheduler) = observer.upgrade() {
                let _ = scheduler.is_skater_finished(lap.record.lane);
                let _ = scheduler.remaining_events();
            }
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        scheduler
            .start_race(race(LapTarget::whole(2), vec![explicit(1, &[1.0])]))
            .unwrap();
        clock.advance(TimeDelta::seconds(5));
        scheduler.process_events(clock.now());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_race_replaces_previous() {
        let f = fixture(0);
        f.scheduler
            .start_race(race(LapTarget::whole(2), vec![explicit(1, &[5.0])]))
            .unwrap();
        f.clock.advance(TimeDelta::seconds(6));
        f.scheduler.process_events(f.clock.now());

        f.scheduler
            .start_race(race(LapTarget::whole(3), vec![explicit(2, &[5.0])]))
            .unwrap();
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Built);
        assert_eq!(f.scheduler.remaining_events(), 3);
        assert!(!f.scheduler.is_race_finished());
        assert_eq!(f.scheduler.race_snapshot().unwrap().skaters[0].lane, 2);
    }

    #[test]
    fn test_start_race_during_force_drain_keeps_new_schedule() {
        let clock = Arc::new(ManualClock::new(Local::now()));
        let scheduler = Arc::new(EventScheduler::new(
            LapTimeGenerator::new(0, clock.clone()),
            clock.clone(),
        ));

        let reloaded = Arc::new(AtomicUsize::new(0));
        let observer = Arc::downgrade(&scheduler);
        let counter = Arc::clone(&reloaded);
        scheduler.set_callback(Arc::new(move |_: &LapCompleted| {
            // Load the next race from inside the first release
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(scheduler) = observer.upgrade() {
                    scheduler
                        .start_race(race(LapTarget::whole(3), vec![explicit(2, &[5.0])]))
                        .unwrap();
                }
            }
        }));

        scheduler
            .start_race(race(LapTarget::whole(2), vec![explicit(1, &[1.0])]))
            .unwrap();

        // The old race stops after the release that replaced it
        assert_eq!(scheduler.process_all_remaining(), 1);

        assert_eq!(scheduler.phase(), SchedulerPhase::Built);
        assert_eq!(scheduler.remaining_events(), 3);
        assert!(!scheduler.is_race_finished());
        let snapshot = scheduler.race_snapshot().unwrap();
        assert_eq!(snapshot.skaters[0].lane, Lane::new(2));
        assert!(snapshot.skaters[0].laps().is_empty());

        // The new race drains normally
        clock.advance(TimeDelta::seconds(20));
        assert_eq!(scheduler.process_events(clock.now()), 3);
    }

    #[test]
    fn test_start_race_empty_times_keeps_state() {
        let f = fixture(0);
        let err = f
            .scheduler
            .start_race(race(LapTarget::whole(2), vec![explicit(1, &[])]))
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidState { .. }));
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Idle);
        assert!(f.scheduler.race_snapshot().is_none());
    }

    #[test]
    fn test_idle_scheduler_is_inert() {
        let f = fixture(0);
        assert_eq!(f.scheduler.process_events(f.clock.now()), 0);
        assert_eq!(f.scheduler.process_all_remaining(), 0);
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Idle);
        assert!(!f.scheduler.is_race_finished());
        assert!(f.scheduler.next_event_time().is_none());
    }
}
