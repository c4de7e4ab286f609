//! 追踪初始化、网关指标与用户可见的事件日志。

mod event_log;

pub use event_log::{EventLog, LogEntry, LogLevel, MemoryEventLog, TracingEventLog};

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 网关指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connects: u64,
    pub connect_failures: u64,
    pub poll_cycles: u64,
    pub poll_failures: u64,
    pub tags_polled: u64,
    pub changes_found: u64,
    pub trigger_fires: u64,
    pub fires_suppressed: u64,
    pub dispatch_success: u64,
    pub dispatch_failure: u64,
    pub ack_failures: u64,
}

/// 网关指标（原子计数器），由装配方创建后注入监管器与触发引擎。
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    poll_cycles: AtomicU64,
    poll_failures: AtomicU64,
    tags_polled: AtomicU64,
    changes_found: AtomicU64,
    trigger_fires: AtomicU64,
    fires_suppressed: AtomicU64,
    dispatch_success: AtomicU64,
    dispatch_failure: AtomicU64,
    ack_failures: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            tags_polled: self.tags_polled.load(Ordering::Relaxed),
            changes_found: self.changes_found.load(Ordering::Relaxed),
            trigger_fires: self.trigger_fires.load(Ordering::Relaxed),
            fires_suppressed: self.fires_suppressed.load(Ordering::Relaxed),
            dispatch_success: self.dispatch_success.load(Ordering::Relaxed),
            dispatch_failure: self.dispatch_failure.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
        }
    }

    /// 记录连接结果。
    pub fn record_connect(&self, success: bool) {
        if success {
            self.connects.fetch_add(1, Ordering::Relaxed);
        } else {
            self.connect_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 记录一次成功的轮询周期。
    pub fn record_poll_cycle(&self, tags: u64, changes: u64) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
        self.tags_polled.fetch_add(tags, Ordering::Relaxed);
        self.changes_found.fetch_add(changes, Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trigger_fire(&self) {
        self.trigger_fires.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录被去抖抑制的边沿。
    pub fn record_fire_suppressed(&self) {
        self.fires_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录单个下游发布结果。
    pub fn record_dispatch(&self, success: bool) {
        if success {
            self.dispatch_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dispatch_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ack_failure(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
