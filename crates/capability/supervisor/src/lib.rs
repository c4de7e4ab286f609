//! # PLC 连接监管能力模块
//!
//! 每台 PLC 一个 `PlcEntry`，由 `Supervisor` 独占：
//!
//! ```text
//! add_plc ──► PlcEntry ──connect──► Session(Driver) ──► Poller ──► TagCache
//!                │                                          │
//!                └── ReconnectPolicy ◄── Error ◄────────────┘ (连续失败)
//!                                                           │
//!                                         broadcast<PlcEvent> ──► 触发引擎
//! ```
//!
//! 外部只通过拷贝视图访问运行时状态。

mod cache;
mod entry;
mod error;
mod poller;
mod session;
mod supervisor;

pub use error::SupervisorError;
pub use supervisor::Supervisor;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// 重连策略：初始间隔逐次翻倍，不超过上限。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次（从 0 开始）重连前的等待时间。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// 监管器运行参数。
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// 连续轮询失败达到该次数后降级为 Error
    pub failure_threshold: u32,
    pub reconnect: ReconnectPolicy,
    /// PLC 事件广播通道容量
    pub event_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reconnect: ReconnectPolicy::default(),
            event_capacity: 1024,
        }
    }
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
