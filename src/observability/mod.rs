//! 可观测性：tracing 日志初始化与指标汇

pub mod metrics;

pub use metrics::{MetricEvent, MetricKind, Metrics, MetricsSnapshot, TimerGuard};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化日志；RUST_LOG 优先于配置中的 level。重复调用无副作用
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
