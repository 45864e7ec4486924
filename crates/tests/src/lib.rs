//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 示例配置快照测试
//! - 配置 -> 调度器 -> 编码器 -> sinks 端到端测试（手动时钟，无需真实计时设备）

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{LapTarget, PaceSource};

    const SAMPLE_YAML: &str = include_str!("../../../config/sample-race.yml");
    const SPRINT_TOML: &str = include_str!("../../../config/sprint.toml");

    /// 验证仓库自带的示例配置可加载
    #[test]
    fn test_sample_configs_load() {
        let sample = ConfigLoader::load_from_str(SAMPLE_YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(sample.lap_target(), Some(LapTarget::with_half_lap(4)));
        assert_eq!(sample.skaters.len(), 4);
        assert!(matches!(
            sample.skaters[2].pace_source(),
            Some(PaceSource::Explicit(ref times)) if times.len() == 5
        ));

        let sprint = ConfigLoader::load_from_str(SPRINT_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(sprint.lap_target(), Some(LapTarget::whole(3)));
        assert!(sprint.race.send_zero_packet);
        assert!(sprint.race.dual_transponder.delay().is_none());
    }

    /// YAML -> JSON -> YAML 后语义不变
    #[test]
    fn test_sample_config_format_round_trip() {
        let sample = ConfigLoader::load_from_str(SAMPLE_YAML, ConfigFormat::Yaml).unwrap();
        let json = ConfigLoader::to_json(&sample).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();

        assert_eq!(reloaded.race.laps, sample.race.laps);
        assert_eq!(reloaded.race.tcp.address(), sample.race.tcp.address());
        assert_eq!(
            reloaded.race.labels.to_labels(),
            sample.race.labels.to_labels()
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{Local, TimeDelta, TimeZone};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        Clock, Lane, LapCompleted, LapTarget, OpCode, PaceSource, Race, SinkConfig, SinkType,
        Skater, SyncStatus, Timestamp, TimingPacket,
    };
    use dispatcher::{create_dispatcher, PacketEncoder};
    use race_engine::{EventScheduler, LapTimeGenerator, ManualClock};
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const RACE_YAML: &str = r#"
race:
  laps: 2
  dual_transponder: { enabled: true, delay_milliseconds: 50 }
  labels: { event: "7", round: "2" }
skaters:
  - { lane: 1, times: [9.0, 8.0] }
  - { lane: 2, times: [8.5, 8.5] }
"#;

    fn race_start() -> Timestamp {
        Local.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap()
    }

    fn scheduler(clock: &Arc<ManualClock>, seed: u64) -> EventScheduler {
        EventScheduler::new(LapTimeGenerator::new(seed, clock.clone()), clock.clone())
    }

    /// 收集回调中的 LapCompleted
    fn collect_laps(scheduler: &EventScheduler) -> Arc<Mutex<Vec<LapCompleted>>> {
        let laps = Arc::new(Mutex::new(Vec::new()));
        let sink = laps.clone();
        scheduler.set_callback(Arc::new(move |lap: &LapCompleted| {
            sink.lock().unwrap().push(lap.clone());
        }));
        laps
    }

    /// 4.5 圈、单人、平均配速：1 个半圈 + 4 个整圈
    #[test]
    fn test_half_lap_race_scenario() {
        let clock = Arc::new(ManualClock::new(race_start()));
        let scheduler = scheduler(&clock, 42);
        let laps = collect_laps(&scheduler);

        let race = Race::new(
            LapTarget::from_laps(4.5).unwrap(),
            vec![Skater::new(Lane::new(1), PaceSource::Average(10.0))],
            race_start(),
        );
        scheduler.start_race(race).unwrap();

        let events = scheduler.events();
        assert_eq!(events.len(), 5);
        assert!(events[0].is_half_lap);
        assert!(events[1..].iter().all(|e| !e.is_half_lap));

        assert_eq!(scheduler.process_all_remaining(), 5);

        let race = scheduler.race_snapshot().unwrap();
        assert_eq!(race.skaters[0].current_lap, 6);
        assert!(scheduler.is_skater_finished(Lane::new(1)));
        assert!(race.finished);

        let laps = laps.lock().unwrap();
        assert_eq!(laps.len(), 5);
        assert_eq!(laps[0].record.label(), "Half-lap");
        assert!(laps[4].skater_finished);
    }

    /// 调度器按时间推进释放事件，顺序单调不减，且不提前释放
    #[test]
    fn test_incremental_release_follows_clock() {
        let config = ConfigLoader::load_from_str(RACE_YAML, ConfigFormat::Yaml).unwrap();
        let clock = Arc::new(ManualClock::new(race_start()));
        let scheduler = scheduler(&clock, 1);
        let laps = collect_laps(&scheduler);

        scheduler
            .start_race(config.build_race(clock.now()).unwrap())
            .unwrap();

        // 50ms 轮询步长推进 20 秒
        for _ in 0..400 {
            clock.advance(TimeDelta::milliseconds(50));
            let now = clock.now();
            scheduler.process_events(now);

            for lap in laps.lock().unwrap().iter() {
                assert!(lap.record.timestamp <= now);
            }
        }

        let laps = laps.lock().unwrap();
        let lanes: Vec<u8> = laps.iter().map(|l| l.record.lane.get()).collect();
        // lane 2 @8.5, lane 1 @9.0, lane 2 @17.0, lane 1 @17.0 (ties keep skater order)
        assert_eq!(lanes, vec![2, 1, 1, 2]);

        let times: Vec<Timestamp> = laps.iter().map(|l| l.record.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(scheduler.all_skaters_finished());
    }

    /// 端到端：配置 -> 调度器 -> 编码器 -> TCP 监听端 + 抓包文件
    #[tokio::test]
    async fn test_e2e_race_to_listener_and_capture() {
        let config = ConfigLoader::load_from_str(RACE_YAML, ConfigFormat::Yaml).unwrap();
        let delay = config.race.dual_transponder.delay().unwrap();
        let labels = config.race.labels.to_labels();

        // Timing listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let dir = tempdir().unwrap();
        let capture_path = dir.path().join("capture").join("race.bin");
        let sinks = vec![
            SinkConfig {
                name: "listener".to_string(),
                sink_type: SinkType::Network,
                queue_capacity: 64,
                params: HashMap::from([("addr".to_string(), addr.to_string())]),
            },
            SinkConfig {
                name: "capture".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 64,
                params: HashMap::from([(
                    "path".to_string(),
                    capture_path.display().to_string(),
                )]),
            },
        ];

        let (packet_tx, packet_rx) = mpsc::channel::<TimingPacket>(64);
        let dispatcher = create_dispatcher(sinks, packet_rx).await.unwrap();
        let dispatcher_handle = dispatcher.spawn();

        // Race driven by a manual clock
        let clock = Arc::new(ManualClock::new(race_start()));
        let scheduler = scheduler(&clock, 3);
        let laps = collect_laps(&scheduler);
        scheduler
            .start_race(config.build_race(race_start()).unwrap())
            .unwrap();

        clock.advance(TimeDelta::seconds(30));
        scheduler.process_events(clock.now());
        assert!(scheduler.all_skaters_finished());
        scheduler.process_all_remaining();

        let released: Vec<LapCompleted> = laps.lock().unwrap().clone();
        assert_eq!(released.len(), 4);

        let mut expected = Vec::new();
        for lap in &released {
            let packet = PacketEncoder::split_packet(&lap.record, true).with_labels(labels.clone());
            for p in PacketEncoder::dual_transponder(packet, delay).unwrap() {
                expected.extend_from_slice(&PacketEncoder::encode(&p));
                packet_tx.send(p).await.unwrap();
            }
        }
        drop(packet_tx);

        let metrics = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .expect("dispatcher timed out")
            .unwrap();
        assert!(metrics.iter().all(|(_, m)| m.write_count == 8));

        let received = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("listener timed out")
            .unwrap();
        assert_eq!(received, expected);
        assert_eq!(std::fs::read(&capture_path).unwrap(), expected);

        // 8 CRLF-terminated lines, every one a sync-ok split carrying labels
        let lines: Vec<&[u8]> = received
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .collect();
        assert_eq!(lines.len(), 8);
        for line in lines {
            assert_eq!(line[0], 0x01);
            assert_eq!(&line[1..3], b"S,");
            assert!(line.ends_with(b",7,2\r"));
        }
    }

    /// 超出范围的双传感器延迟在加载时被拒绝，编码器也不会 panic
    #[test]
    fn test_oversized_dual_delay_rejected() {
        let yaml = RACE_YAML.replace("delay_milliseconds: 50", "delay_milliseconds: 1.0e17");
        let err = ConfigLoader::load_from_str(&yaml, ConfigFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("delay_milliseconds"));

        let packet = TimingPacket::split(SyncStatus::SyncOk, race_start(), Lane::new(1));
        assert!(PacketEncoder::dual_transponder(packet, TimeDelta::MAX).is_none());
    }

    /// 双传感器：两包仅时间不同，相差配置的延迟
    #[test]
    fn test_dual_transponder_pair() {
        let config = ConfigLoader::load_from_str(RACE_YAML, ConfigFormat::Yaml).unwrap();
        let delay = config.race.dual_transponder.delay().unwrap();

        let time = race_start() + TimeDelta::milliseconds(9_000);
        let packet = TimingPacket::split(SyncStatus::SyncOk, time, Lane::new(1));
        let [first, second] = PacketEncoder::dual_transponder(packet, delay).unwrap();

        assert_eq!(first.opcode(), OpCode::Split);
        assert_eq!(second.time() - first.time(), TimeDelta::milliseconds(50));
        assert_eq!(first.clone().with_time(second.time()), second);
        assert_eq!(
            PacketEncoder::encode(&second).as_ref(),
            b"\x01S,08:00:09.050,1\r\n"
        );
    }
}
