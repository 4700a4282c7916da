//! 发布指标收集模块
//!
//! 基于 `Observer` 回调收集和统计批量发布的运行指标。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use contracts::Observer;
use metrics::{counter, describe_counter, describe_histogram, histogram};

/// 摘要中单独统计的目的地上限，超出部分计入 [`OTHER_DESTINATIONS`]
pub const MAX_TRACKED_DESTINATIONS: usize = 100;

/// 超出上限的目的地汇总键
pub const OTHER_DESTINATIONS: &str = "other";

/// 向当前记录器登记全部 `event_publisher_*` 指标说明
///
/// 在安装 Prometheus 记录器后调用一次，`/metrics` 输出带 `# HELP` 行。
pub fn describe_metrics() {
    describe_counter!("event_publisher_batches_total", "Batches passed to publish");
    describe_counter!("event_publisher_events_total", "Events received in batches");
    describe_counter!(
        "event_publisher_events_acked_total",
        "Events delivered and acknowledged"
    );
    describe_counter!(
        "event_publisher_events_failed_total",
        "Events handed back for retry"
    );
    describe_counter!(
        "event_publisher_events_dropped_total",
        "Events dropped without retry"
    );
    describe_counter!(
        "event_publisher_events_excluded_total",
        "Events that matched no route, by reason"
    );
    describe_counter!(
        "event_publisher_groups_sent_total",
        "Destination groups sent, by status"
    );
    describe_histogram!("event_publisher_batch_size", "Events per batch");
    describe_histogram!("event_publisher_group_size", "Messages per destination group");
    describe_histogram!(
        "event_publisher_publish_latency_ms",
        "Time to publish one batch in milliseconds"
    );
}

/// 记录新批次
pub fn record_batch(events: usize) {
    counter!("event_publisher_batches_total").increment(1);
    counter!("event_publisher_events_total").increment(events as u64);
    histogram!("event_publisher_batch_size").record(events as f64);
}

/// 记录已确认事件
pub fn record_acked(events: usize) {
    counter!("event_publisher_events_acked_total").increment(events as u64);
}

/// 记录待重试事件
pub fn record_failed(events: usize) {
    counter!("event_publisher_events_failed_total").increment(events as u64);
}

/// 记录丢弃事件
pub fn record_dropped(events: usize) {
    counter!("event_publisher_events_dropped_total").increment(events as u64);
}

/// 记录目的地分组发送结果
///
/// 目的地来自事件内容，不作为标签，避免序列数量无界增长。
pub fn record_group_sent(events: usize, ok: bool) {
    let status = if ok { "success" } else { "failure" };
    counter!("event_publisher_groups_sent_total", "status" => status).increment(1);
    histogram!("event_publisher_group_size").record(events as f64);
}

/// 记录未匹配路由的事件
pub fn record_exclusion(reason: &str) {
    counter!(
        "event_publisher_events_excluded_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录单批次发布耗时
pub fn record_publish_latency_ms(latency_ms: f64) {
    histogram!("event_publisher_publish_latency_ms").record(latency_ms);
}

/// 将发布计数写入 `metrics` 记录器并在内存中聚合
///
/// 未安装记录器时 `metrics` 宏为空操作，聚合统计仍然有效。
#[derive(Debug, Default)]
pub struct MetricsObserver {
    aggregator: Mutex<PublishMetricsAggregator>,
}

impl MetricsObserver {
    /// 创建新的观察者
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前摘要
    pub fn summary(&self) -> MetricsSummary {
        self.aggregate(|a| a.summary())
    }

    fn aggregate<R>(&self, f: impl FnOnce(&mut PublishMetricsAggregator) -> R) -> R {
        let mut aggregator = self.aggregator.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut aggregator)
    }
}

impl Observer for MetricsObserver {
    fn new_batch(&self, n: usize) {
        record_batch(n);
        self.aggregate(|a| a.batch(n));
    }

    fn dropped(&self, n: usize) {
        record_dropped(n);
        self.aggregate(|a| a.total_dropped += n as u64);
    }

    fn acked(&self, n: usize) {
        record_acked(n);
        self.aggregate(|a| a.total_acked += n as u64);
    }

    fn failed(&self, n: usize) {
        record_failed(n);
        self.aggregate(|a| a.total_failed += n as u64);
    }

    fn group_sent(&self, destination: &str, events: usize, ok: bool) {
        record_group_sent(events, ok);
        self.aggregate(|a| a.group(destination, events, ok));
    }

    fn excluded(&self, reason: &str) {
        record_exclusion(reason);
        self.aggregate(|a| *a.exclusion_counts.entry(reason.to_string()).or_insert(0) += 1);
    }
}

/// 发布指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PublishMetricsAggregator {
    /// 总批次数
    pub total_batches: u64,

    /// 总事件数
    pub total_events: u64,

    /// 已确认事件
    pub total_acked: u64,

    /// 待重试事件
    pub total_failed: u64,

    /// 丢弃事件
    pub total_dropped: u64,

    /// 批次大小统计
    pub batch_size_stats: RunningStats,

    /// 分组大小统计
    pub group_size_stats: RunningStats,

    /// 各目的地发送失败次数（最多 [`MAX_TRACKED_DESTINATIONS`] 个键）
    pub group_failures: HashMap<String, u64>,

    /// 各原因未路由次数
    pub exclusion_counts: HashMap<String, u64>,
}

impl PublishMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录新批次
    pub fn batch(&mut self, events: usize) {
        self.total_batches += 1;
        self.total_events += events as u64;
        self.batch_size_stats.push(events as f64);
    }

    /// 记录分组发送结果
    pub fn group(&mut self, destination: &str, events: usize, ok: bool) {
        self.group_size_stats.push(events as f64);
        if ok {
            return;
        }
        let key = if self.group_failures.contains_key(destination)
            || self.group_failures.len() < MAX_TRACKED_DESTINATIONS
        {
            destination
        } else {
            OTHER_DESTINATIONS
        };
        *self.group_failures.entry(key.to_string()).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let rate = |n: u64| {
            if self.total_events > 0 {
                n as f64 / self.total_events as f64 * 100.0
            } else {
                0.0
            }
        };

        MetricsSummary {
            total_batches: self.total_batches,
            total_events: self.total_events,
            total_acked: self.total_acked,
            total_failed: self.total_failed,
            total_dropped: self.total_dropped,
            drop_rate: rate(self.total_dropped),
            retry_rate: rate(self.total_failed),
            batch_size: StatsSummary::from(&self.batch_size_stats),
            group_size: StatsSummary::from(&self.group_size_stats),
            group_failures: self.group_failures.clone(),
            exclusion_counts: self.exclusion_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_batches: u64,
    pub total_events: u64,
    pub total_acked: u64,
    pub total_failed: u64,
    pub total_dropped: u64,
    pub drop_rate: f64,
    pub retry_rate: f64,
    pub batch_size: StatsSummary,
    pub group_size: StatsSummary,
    pub group_failures: HashMap<String, u64>,
    pub exclusion_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Publish Metrics Summary ===")?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(f, "Events: {}", self.total_events)?;
        writeln!(f, "Acked: {}", self.total_acked)?;
        writeln!(
            f,
            "Handed back for retry: {} ({:.2}%)",
            self.total_failed, self.retry_rate
        )?;
        writeln!(
            f,
            "Dropped: {} ({:.2}%)",
            self.total_dropped, self.drop_rate
        )?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Group size: {}", self.group_size)?;

        if !self.exclusion_counts.is_empty() {
            writeln!(f, "Unrouted events:")?;
            for (reason, count) in &self.exclusion_counts {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        if !self.group_failures.is_empty() {
            writeln!(f, "Failed groups:")?;
            for (destination, count) in &self.group_failures {
                writeln!(f, "  {}: {}", destination, count)?;
            }
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

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
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
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
