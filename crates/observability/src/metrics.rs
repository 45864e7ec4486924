//! 比赛指标收集模块
//!
//! 基于 LapCompleted 事件收集和统计圈速与发包指标。

use std::collections::BTreeMap;
use std::fmt;

use contracts::{Lane, LapCompleted};
use metrics::{counter, histogram};

/// 记录一圈完成
///
/// 调度器每释放一个事件调用一次。
pub fn record_lap_completed(lap: &LapCompleted) {
    counter!(
        "lapsynth_laps_completed_total",
        "lane" => lap.record.lane.to_string()
    )
    .increment(1);

    histogram!("lapsynth_lap_duration_seconds").record(lap.record.duration_secs);

    if lap.skater_finished {
        counter!("lapsynth_skaters_finished_total").increment(1);
    }
}

/// 记录一次轮询释放的事件数
///
/// 轮询滞后时批量会变大。
pub fn record_release_batch(released: usize) {
    histogram!("lapsynth_release_batch_size").record(released as f64);
}

/// 记录比赛结束
pub fn record_race_completed() {
    counter!("lapsynth_races_completed_total").increment(1);
}

/// 记录数据包分发结果
pub fn record_packet_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "lapsynth_packets_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录队列满导致的丢包
pub fn record_packet_dropped(sink_name: &str) {
    counter!(
        "lapsynth_packets_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => "dropped"
    )
    .increment(1);
}

/// 圈速聚合器
///
/// 在内存中按赛道聚合圈速，便于赛后输出摘要。半圈单独计数，不计入圈速统计。
#[derive(Debug, Clone, Default)]
pub struct RaceMetricsAggregator {
    lanes: BTreeMap<Lane, LaneStats>,
    total_laps: u64,
}

#[derive(Debug, Clone, Default)]
struct LaneStats {
    laps: RunningStats,
    half_laps: u64,
    finished: bool,
}

impl RaceMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, lap: &LapCompleted) {
        self.total_laps += 1;

        let lane = self.lanes.entry(lap.record.lane).or_default();
        if lap.record.is_half_lap {
            lane.half_laps += 1;
        } else {
            lane.laps.push(lap.record.duration_secs);
        }
        lane.finished |= lap.skater_finished;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> RaceSummary {
        RaceSummary {
            total_laps: self.total_laps,
            lanes: self
                .lanes
                .iter()
                .map(|(lane, stats)| LaneSummary {
                    lane: *lane,
                    half_laps: stats.half_laps,
                    finished: stats.finished,
                    lap_secs: StatsSummary::from(&stats.laps),
                })
                .collect(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 比赛摘要
#[derive(Debug, Clone, Default)]
pub struct RaceSummary {
    pub total_laps: u64,
    /// 按赛道号排序
    pub lanes: Vec<LaneSummary>,
}

/// 单赛道摘要
#[derive(Debug, Clone)]
pub struct LaneSummary {
    pub lane: Lane,
    pub half_laps: u64,
    pub finished: bool,
    pub lap_secs: StatsSummary,
}

impl fmt::Display for RaceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Lap Statistics ===")?;
        writeln!(f, "Laps released: {}", self.total_laps)?;
        for lane in &self.lanes {
            let status = if lane.finished { "finished" } else { "running" };
            writeln!(f, "  Lane {:>2} ({status}): {}", lane.lane, lane.lap_secs)?;
        }
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "best={:.3}s, worst={:.3}s, mean={:.3}s, std={:.3}s (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
