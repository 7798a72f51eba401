//! 指标汇：计数器、计时器、仪表、直方图、错误计数与请求健康度
//!
//! 所有修改都在同一把互斥锁下完成，锁内只做数值更新；snapshot 在锁内克隆原始数据，
//! 锁外计算统计量。每次修改会在广播通道上发布 MetricEvent（无订阅者也无妨）。
//! 不提供全局实例：由调用方创建 `Arc<Metrics>` 并注入。

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// 每个计时器 / 直方图最多保留的样本数
pub const MAX_SAMPLES: usize = 1000;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Timer,
    Gauge,
    Histogram,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerStats {
    pub count: usize,
    pub min: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramStats {
    pub count: usize,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// 无请求时为 None
    pub success_rate: Option<f64>,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, i64>,
    pub timers: BTreeMap<String, TimerStats>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramStats>,
    pub error_counts: BTreeMap<String, u64>,
    pub system_health: SystemHealth,
}

#[derive(Debug)]
struct Store {
    counters: BTreeMap<String, i64>,
    timers: BTreeMap<String, VecDeque<f64>>,
    gauges: BTreeMap<String, f64>,
    histograms: BTreeMap<String, VecDeque<f64>>,
    error_counts: BTreeMap<String, u64>,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    started: Instant,
}

impl Store {
    fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
            timers: BTreeMap::new(),
            gauges: BTreeMap::new(),
            histograms: BTreeMap::new(),
            error_counts: BTreeMap::new(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            started: Instant::now(),
        }
    }
}

fn push_sample(ring: &mut VecDeque<f64>, value: f64) {
    ring.push_back(value);
    while ring.len() > MAX_SAMPLES {
        ring.pop_front();
    }
}

/// 线程安全指标汇
pub struct Metrics {
    store: Mutex<Store>,
    events: broadcast::Sender<MetricEvent>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: Mutex::new(Store::new()),
            events,
        }
    }

    fn with_store<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn publish(&self, name: &str, kind: MetricKind, value: f64) {
        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = self.events.send(MetricEvent {
            name: name.to_string(),
            kind,
            value,
            timestamp: Utc::now(),
        });
    }

    /// 订阅指标事件流
    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.events.subscribe()
    }

    pub fn increment(&self, name: &str, delta: i64) {
        self.with_store(|s| *s.counters.entry(name.to_string()).or_insert(0) += delta);
        tracing::debug!(counter = name, delta, "counter incremented");
        self.publish(name, MetricKind::Counter, delta as f64);
    }

    /// 记录一次耗时（毫秒）
    pub fn timing(&self, name: &str, duration_ms: f64) {
        self.with_store(|s| {
            push_sample(s.timers.entry(name.to_string()).or_default(), duration_ms)
        });
        tracing::debug!(timer = name, duration_ms, "timer recorded");
        self.publish(name, MetricKind::Timer, duration_ms);
    }

    pub fn gauge(&self, name: &str, value: f64) {
        self.with_store(|s| s.gauges.insert(name.to_string(), value));
        tracing::debug!(gauge = name, value, "gauge set");
        self.publish(name, MetricKind::Gauge, value);
    }

    pub fn histogram(&self, name: &str, value: f64) {
        self.with_store(|s| {
            push_sample(s.histograms.entry(name.to_string()).or_default(), value)
        });
        tracing::debug!(histogram = name, value, "histogram sample recorded");
        self.publish(name, MetricKind::Histogram, value);
    }

    /// 错误计数；同时计入 failed_requests
    pub fn error_count(&self, name: &str, delta: u64) {
        self.with_store(|s| {
            *s.error_counts.entry(name.to_string()).or_insert(0) += delta;
            s.failed_requests += delta;
        });
        tracing::warn!(error_type = name, delta, "error count incremented");
        self.publish(name, MetricKind::Error, delta as f64);
    }

    pub fn record_request(&self) {
        self.with_store(|s| s.total_requests += 1);
    }

    pub fn record_success(&self) {
        self.with_store(|s| s.successful_requests += 1);
    }

    /// 开始计时；guard 在 drop（包括 panic 展开）时记录耗时
    pub fn start_timer<'a>(&'a self, name: &str) -> TimerGuard<'a> {
        TimerGuard {
            metrics: self,
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// 计时执行同步闭包
    pub fn timed<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let _guard = self.start_timer(name);
        f()
    }

    /// 计时执行 future；future 被丢弃时同样记录
    pub async fn timed_async<F: Future>(&self, name: &str, fut: F) -> F::Output {
        let _guard = self.start_timer(name);
        fut.await
    }

    pub fn reset(&self) {
        self.with_store(|s| *s = Store::new());
        tracing::info!("metrics reset");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (counters, timers, gauges, histograms, error_counts, totals, uptime) =
            self.with_store(|s| {
                (
                    s.counters.clone(),
                    s.timers.clone(),
                    s.gauges.clone(),
                    s.histograms.clone(),
                    s.error_counts.clone(),
                    (s.total_requests, s.successful_requests, s.failed_requests),
                    s.started.elapsed(),
                )
            });

        let timers = timers
            .into_iter()
            .filter_map(|(name, samples)| timer_stats(samples).map(|st| (name, st)))
            .collect();
        let histograms = histograms
            .into_iter()
            .filter_map(|(name, samples)| histogram_stats(&samples).map(|st| (name, st)))
            .collect();

        let (total, successful, failed) = totals;
        MetricsSnapshot {
            counters,
            timers,
            gauges,
            histograms,
            error_counts,
            system_health: SystemHealth {
                total_requests: total,
                successful_requests: successful,
                failed_requests: failed,
                success_rate: (total > 0).then(|| successful as f64 / total as f64),
                uptime_seconds: uptime.as_secs_f64(),
            },
        }
    }
}

/// 计时守卫
pub struct TimerGuard<'a> {
    metrics: &'a Metrics,
    name: String,
    start: Instant,
}

impl TimerGuard<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.timing(&self.name, ms);
    }
}

/// 排序后按下标取百分位：sorted[floor(len * q)]，越界取最后一个
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64) * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn timer_stats(samples: VecDeque<f64>) -> Option<TimerStats> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = samples.into_iter().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let count = sorted.len();
    Some(TimerStats {
        count,
        min: sorted[0],
        avg: sorted.iter().sum::<f64>() / count as f64,
        p50: sorted[count / 2],
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
        max: sorted[count - 1],
    })
}

fn histogram_stats(samples: &VecDeque<f64>) -> Option<HistogramStats> {
    if samples.is_empty() {
        return None;
    }
    let count = samples.len();
    Some(HistogramStats {
        count,
        min: samples.iter().copied().fold(f64::INFINITY, f64::min),
        avg: samples.iter().sum::<f64>() / count as f64,
        max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}
