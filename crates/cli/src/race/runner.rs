//! Race runner - drives one race from start to results.
//!
//! The scheduler callback only forwards lap events into a channel; a
//! consumer task prints them and emits their packets, so the dual-transponder
//! delay never stalls the poll loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use contracts::{
    wire_text, Clock, EventLabel, LapCompleted, LapRecord, Race, RaceConfig, TimingPacket,
};
use dispatcher::PacketEncoder;
use race_engine::EventScheduler;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::report::{print_final_results, RaceReport};
use crate::console::StopReason;
use crate::error::CliError;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Validated race configuration
    pub race: RaceConfig,

    /// Scheduler poll interval
    pub poll_interval: Duration,

    /// Whether packets reach a live listener (display only)
    pub online: bool,
}

/// Result of one race
#[derive(Debug)]
pub struct RaceOutcome {
    /// Final race state; `end_time` is always set
    pub race: Race,
    pub report: RaceReport,
    /// Set when the race was stopped before every skater finished
    pub stopped: Option<StopReason>,
}

/// Sends timing packets to the dispatcher, doubling splits when dual
/// transponders are enabled.
#[derive(Debug, Clone)]
pub struct PacketEmitter {
    tx: mpsc::Sender<TimingPacket>,
    dual_delay: Option<TimeDelta>,
    labels: Option<EventLabel>,
    online: bool,
}

impl PacketEmitter {
    pub fn new(tx: mpsc::Sender<TimingPacket>, race: &RaceConfig, online: bool) -> Self {
        Self {
            tx,
            dual_delay: race.race.dual_transponder.delay(),
            labels: race.race.labels.to_labels(),
            online,
        }
    }

    /// Emit the split packet(s) for one crossing.
    ///
    /// The second dual-transponder packet is sent `delay` after the first.
    pub async fn emit_split(&self, record: &LapRecord) -> bool {
        let packet = PacketEncoder::split_packet(record, true).with_labels(self.labels.clone());

        let Some(delay) = self.dual_delay else {
            return self.emit(packet).await;
        };

        match PacketEncoder::dual_transponder(packet.clone(), delay) {
            Some([first, second]) => {
                if !self.emit(first).await {
                    return false;
                }
                tokio::time::sleep(delay.to_std().unwrap_or_default()).await;
                self.emit(second).await
            }
            None => {
                warn!(?delay, "Dual-transponder delay out of range, sending one packet");
                self.emit(packet).await
            }
        }
    }

    /// Emit one packet and echo its wire text.
    pub async fn emit(&self, packet: TimingPacket) -> bool {
        println!("  -> Packet: {}", wire_text(&PacketEncoder::encode(&packet)));

        if self.tx.send(packet).await.is_err() {
            warn!("Dispatcher channel closed");
            println!("  -> Packet error: dispatcher stopped");
            return false;
        }

        if self.online {
            println!("  -> Sent to timing listener");
        } else {
            println!("  -> (Not sent - no TCP connection)");
        }
        true
    }
}

/// Runs races of one configuration against a shared scheduler.
pub struct RaceRunner {
    config: RunnerConfig,
    scheduler: EventScheduler,
    clock: Arc<dyn Clock>,
    emitter: PacketEmitter,
}

impl RaceRunner {
    pub fn new(
        config: RunnerConfig,
        scheduler: EventScheduler,
        clock: Arc<dyn Clock>,
        packets: mpsc::Sender<TimingPacket>,
    ) -> Self {
        let emitter = PacketEmitter::new(packets, &config.race, config.online);
        Self {
            config,
            scheduler,
            clock,
            emitter,
        }
    }

    /// Run one race until every skater finished or `stop` resolves.
    #[instrument(
        name = "race_runner_run",
        skip(self, stop),
        fields(laps = self.config.race.race.laps, skaters = self.config.race.skaters.len())
    )]
    pub async fn run<F>(&self, stop: F) -> Result<RaceOutcome>
    where
        F: Future<Output = StopReason>,
    {
        let race = self
            .config
            .race
            .build_race(self.clock.now())
            .map_err(|e| CliError::race(e.to_string()))?;

        let (lap_tx, lap_rx) = mpsc::unbounded_channel::<LapCompleted>();
        self.scheduler.set_callback(Arc::new(move |lap: &LapCompleted| {
            // Receiver gone only after the race loop ended
            let _ = lap_tx.send(lap.clone());
        }));

        if let Err(e) = self.scheduler.start_race(race) {
            self.scheduler.clear_callback();
            return Err(CliError::race(e.to_string()).into());
        }

        let started = self
            .scheduler
            .race_snapshot()
            .ok_or_else(|| CliError::race("scheduler holds no race after start"))?;

        println!("=== LAP TIMES ===");
        println!();
        self.announce_start(&started).await;

        let consumer = tokio::spawn(consume_laps(
            lap_rx,
            self.emitter.clone(),
            RaceReport::new(started.start_time),
        ));

        let stopped = self.poll_until_done(stop).await;

        // Dropping the callback closes the lap channel and ends the consumer
        self.scheduler.clear_callback();
        let report = consumer.await.context("Lap consumer task failed")?;

        let mut race = self
            .scheduler
            .race_snapshot()
            .ok_or_else(|| CliError::race("race state lost"))?;
        if race.end_time.is_none() {
            race.end_time = Some(self.clock.now());
        }

        print_final_results(&race, &report);

        Ok(RaceOutcome {
            race,
            report,
            stopped,
        })
    }

    /// Optional `Z` packet, then start-line crossings for whole-lap races.
    async fn announce_start(&self, race: &Race) {
        if self.config.race.race.send_zero_packet {
            println!("Race started - sending zero packet");
            self.emitter
                .emit(PacketEncoder::zero_packet(race.start_time))
                .await;
        } else {
            println!("Race started - using Internal Sync mode");
        }
        println!();

        // Skaters of a half-lap race start mid-lap and never cross the line here
        if race.has_half_lap() {
            return;
        }

        for skater in &race.skaters {
            println!("[+0.0s] Lane {} - Start", skater.lane);
            let crossing = LapRecord {
                lane: skater.lane,
                lap_number: 0,
                duration_secs: 0.0,
                timestamp: race.start_time,
                is_half_lap: false,
            };
            self.emitter.emit_split(&crossing).await;
        }
    }

    async fn poll_until_done<F>(&self, stop: F) -> Option<StopReason>
    where
        F: Future<Output = StopReason>,
    {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let released = self.scheduler.process_events(self.clock.now());
                    if released > 0 {
                        debug!(released, remaining = self.scheduler.remaining_events(), "Poll released laps");
                    }

                    if self.scheduler.all_skaters_finished() {
                        self.scheduler.process_all_remaining();
                        info!("All skaters finished");
                        return None;
                    }
                }
                reason = &mut stop => {
                    match reason {
                        StopReason::User => println!("\nRace stopped by user."),
                        StopReason::Signal => println!("\nRace interrupted."),
                    }
                    warn!(?reason, remaining = self.scheduler.remaining_events(), "Race stopped early");
                    return Some(reason);
                }
            }
        }
    }
}

/// Print and emit every released lap, in release order.
async fn consume_laps(
    mut laps: mpsc::UnboundedReceiver<LapCompleted>,
    emitter: PacketEmitter,
    mut report: RaceReport,
) -> RaceReport {
    while let Some(lap) = laps.recv().await {
        let lines = report.record_lap(&lap);
        let (lap_line, finish_line) = match lines.split_first() {
            Some((first, rest)) => (first.as_str(), rest.first()),
            None => continue,
        };

        println!("{lap_line}");
        emitter.emit_split(&lap.record).await;
        if let Some(finish) = finish_line {
            println!("*** {finish} ***");
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use contracts::{
        DualTransponderSettings, LabelConfig, OpCode, OutputConfig, RaceSettings, SkaterConfig,
        TcpSettings,
    };
    use race_engine::{LapTimeGenerator, ManualClock};

    fn config(laps: f64, times: Vec<f64>, dual: bool, zero: bool) -> RaceConfig {
        RaceConfig {
            race: RaceSettings {
                laps,
                tcp: TcpSettings::default(),
                dual_transponder: DualTransponderSettings {
                    enabled: dual,
                    delay_milliseconds: 1.0,
                },
                labels: LabelConfig::default(),
                send_zero_packet: zero,
                seed: Some(7),
            },
            skaters: vec![SkaterConfig {
                lane: 1,
                average_split_time: None,
                times: Some(times),
            }],
            output: OutputConfig::default(),
        }
    }

    fn runner(
        race: RaceConfig,
        clock: Arc<ManualClock>,
    ) -> (RaceRunner, mpsc::Receiver<TimingPacket>) {
        let (tx, rx) = mpsc::channel(64);
        let scheduler = EventScheduler::new(LapTimeGenerator::new(7, clock.clone()), clock.clone());
        let config = RunnerConfig {
            race,
            poll_interval: Duration::from_millis(1),
            online: false,
        };
        (RaceRunner::new(config, scheduler, clock, tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<TimingPacket>) -> Vec<TimingPacket> {
        let mut packets = Vec::new();
        while let Ok(packet) = rx.try_recv() {
            packets.push(packet);
        }
        packets
    }

    #[tokio::test]
    async fn test_half_lap_race_runs_to_completion() {
        let start = Local.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let (runner, mut rx) = runner(config(2.5, vec![5.0, 9.0], false, false), clock.clone());

        // Every lap becomes due at once, after the race was built
        let advance = async move {
            clock.advance(TimeDelta::seconds(600));
            std::future::pending::<StopReason>().await
        };
        let outcome = runner.run(advance).await.unwrap();

        assert!(outcome.stopped.is_none());
        assert!(outcome.race.finished);
        assert_eq!(outcome.race.skaters[0].current_lap, 4);
        assert_eq!(outcome.race.skaters[0].laps().len(), 3);

        // No start-line crossing for half-lap races, one split per lap
        let packets = drain(&mut rx);
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| p.opcode() == OpCode::Split));

        let lines = outcome.report.lines();
        assert!(lines[0].contains("Half-lap: 5.0000s"));
        assert!(lines.last().unwrap().ends_with("FINISHED!"));
    }

    #[tokio::test]
    async fn test_whole_lap_race_emits_start_crossing_and_zero() {
        let start = Local.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let (runner, mut rx) = runner(config(1.0, vec![8.0], true, true), clock.clone());

        // Let the lap become due only after the race was built
        let advance = {
            let clock = clock.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                clock.advance(TimeDelta::seconds(60));
                std::future::pending::<StopReason>().await
            }
        };
        let outcome = runner.run(advance).await.unwrap();
        assert!(outcome.race.finished);

        let packets = drain(&mut rx);
        // Z, start crossing x2, lap 1 x2
        assert_eq!(packets.len(), 5);
        assert_eq!(packets[0].opcode(), OpCode::Zero);
        assert_eq!(packets[1].time(), outcome.race.start_time);
        assert_eq!(
            packets[2].time() - packets[1].time(),
            TimeDelta::milliseconds(1)
        );
        assert_eq!(
            packets[4].time() - packets[3].time(),
            TimeDelta::milliseconds(1)
        );
    }

    #[tokio::test]
    async fn test_stop_keeps_released_laps() {
        let start = Local.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let (runner, _rx) = runner(config(3.0, vec![10.0], false, false), clock);

        let outcome = runner.run(async { StopReason::User }).await.unwrap();

        assert_eq!(outcome.stopped, Some(StopReason::User));
        assert!(!outcome.race.finished);
        assert!(outcome.race.end_time.is_some());
        assert!(outcome.race.skaters[0].laps().is_empty());
    }

    #[test]
    fn test_console_packet_text_strips_framing() {
        let time = Local.with_ymd_and_hms(2026, 10, 18, 1, 2, 3).unwrap();
        let packet = PacketEncoder::zero_packet(time);
        assert_eq!(wire_text(&PacketEncoder::encode(&packet)), "Z,01:02:03.000");
    }
}
