use arc_swap::ArcSwap;
use domain::{TagData, TriggerConfig, TriggerStatus, TriggerStatusView};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 进入 Error 的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// PLC 缺失、未连接或标签不可读，数据恢复后自动重新布防
    Source,
    /// 条件与标签类型不匹配
    Condition,
    /// 回执写失败（ack_failure_fatal），到期后重新布防
    AckWrite { until: Instant },
}

#[derive(Debug)]
pub(crate) struct TriggerRuntime {
    pub status: TriggerStatus,
    pub fire_count: u64,
    pub last_fire_ms: Option<i64>,
    pub last_error: Option<String>,
    pub last_value: Option<TagData>,
    pub last_condition: Option<bool>,
    pub cooldown_until: Option<Instant>,
    /// 去抖参考点：上一次正式触发的开始时刻
    pub last_fire_started: Option<Instant>,
    pub fault: Option<Fault>,
}

impl TriggerRuntime {
    pub fn new(enabled: bool) -> Self {
        Self {
            status: if enabled {
                TriggerStatus::Armed
            } else {
                TriggerStatus::Disabled
            },
            fire_count: 0,
            last_fire_ms: None,
            last_error: None,
            last_value: None,
            last_condition: None,
            cooldown_until: None,
            last_fire_started: None,
            fault: None,
        }
    }

    /// 清空评估基线（重新布防时使用）。
    pub fn clear_baseline(&mut self) {
        self.last_value = None;
        self.last_condition = None;
        self.cooldown_until = None;
        self.fault = None;
    }
}

/// 单个触发器：配置快照 + 运行时状态 + 评估任务。
pub(crate) struct TriggerSlot {
    pub config: ArcSwap<TriggerConfig>,
    pub runtime: RwLock<TriggerRuntime>,
    /// 评估与触发串行化
    pub exec: tokio::sync::Mutex<()>,
    pub signal: watch::Sender<u64>,
    pub cancel: CancellationToken,
    pub worker: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerSlot {
    pub fn new(config: TriggerConfig, cancel: CancellationToken) -> Self {
        let runtime = TriggerRuntime::new(config.enabled);
        let (signal, _) = watch::channel(0);
        Self {
            config: ArcSwap::from_pointee(config),
            runtime: RwLock::new(runtime),
            exec: tokio::sync::Mutex::new(()),
            signal,
            cancel,
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> Arc<TriggerConfig> {
        self.config.load_full()
    }

    /// 唤醒评估任务（多次唤醒会合并）。
    pub fn nudge(&self) {
        self.signal.send_modify(|seq| *seq = seq.wrapping_add(1));
    }

    /// 定时唤醒点：冷却结束或回执故障到期。
    pub fn wake_at(&self) -> Option<Instant> {
        let runtime = crate::read_lock(&self.runtime);
        match (runtime.status, runtime.fault) {
            (TriggerStatus::Cooldown, _) => runtime.cooldown_until,
            (TriggerStatus::Error, Some(Fault::AckWrite { until })) => Some(until),
            _ => None,
        }
    }

    pub fn set_worker(&self, handle: JoinHandle<()>) {
        *self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
    }

    pub fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn view(&self) -> TriggerStatusView {
        let name = self.config.load().name.clone();
        let runtime = crate::read_lock(&self.runtime);
        TriggerStatusView {
            name,
            status: runtime.status,
            last_error: runtime.last_error.clone(),
            fire_count: runtime.fire_count,
            last_fire_ms: runtime.last_fire_ms,
            last_value: runtime.last_value.clone(),
        }
    }
}
