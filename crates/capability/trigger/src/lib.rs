//! # 触发规则引擎能力模块
//!
//! 每个触发器一个评估任务，由 PLC 刷新事件唤醒：
//!
//! ```text
//! broadcast<PlcEvent> ──► router ──nudge──► worker(trigger) ──► evaluate
//!                                                                  │ 边沿 + 去抖
//!                                                                  ▼
//!                               Armed ─► Firing ─► Cooldown ─► Armed
//!                                           │
//!                                           ├── PublishSink (mqtt / kafka)
//!                                           └── ack 写回 PLC
//! ```

mod access;
mod condition;
mod engine;
mod error;
mod payload;
mod slot;

pub use access::PlcAccess;
pub use engine::TriggerEngine;
pub use error::TriggerError;

use domain::TriggerStatus;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// 引擎设置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// 单个下游发布超时
    pub dispatch_timeout: Duration,
    /// 状态迁移广播容量
    pub transition_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(5),
            transition_capacity: 256,
        }
    }
}

/// 触发器状态迁移事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTransition {
    pub trigger: String,
    pub from: TriggerStatus,
    pub to: TriggerStatus,
}

/// 一次触发的执行结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FireReport {
    pub event_id: String,
    /// 成功送达的下游（`class:name`）
    pub delivered: Vec<String>,
    pub failures: Vec<String>,
    /// 已写回的回执值（1 / -1）
    pub ack: Option<i64>,
    pub ack_error: Option<String>,
}

impl FireReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.ack_error.is_none()
    }

    /// 合并后的错误描述。
    pub fn error(&self) -> Option<String> {
        let mut parts = self.failures.clone();
        if let Some(ack_error) = &self.ack_error {
            parts.push(ack_error.clone());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_joins_dispatch_and_ack_errors() {
        let mut report = FireReport::default();
        assert!(report.is_success());
        assert_eq!(report.error(), None);

        report.failures.push("kafka:lake: destination unavailable".to_string());
        report.ack_error = Some("ack write Ack failed".to_string());
        assert_eq!(
            report.error().as_deref(),
            Some("kafka:lake: destination unavailable; ack write Ack failed")
        );
    }
}
