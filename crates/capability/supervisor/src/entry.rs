use crate::cache::TagCache;
use crate::session::Session;
use crate::{read_lock, write_lock};
use arc_swap::{ArcSwap, ArcSwapOption};
use domain::{ConnectionStatus, DeviceIdentity, PlcConfig, PlcView, PollStats, TagInfo};
use plcgw_driver::DriverFactory;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub(crate) struct PlcState {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub identity: Option<DeviceIdentity>,
}

pub(crate) struct PollerHandle {
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

/// 待执行的重连任务（序号用于识别自身）。
pub(crate) struct PendingRetry {
    pub id: u64,
    pub cancel: CancellationToken,
}

/// 单台 PLC 的运行时条目。
pub(crate) struct PlcEntry {
    pub name: String,
    pub config: ArcSwap<PlcConfig>,
    /// 协议族驱动工厂（add_plc 时选定）
    pub factory: Arc<dyn DriverFactory>,
    pub state: RwLock<PlcState>,
    pub cache: TagCache,
    pub stats: RwLock<PollStats>,
    pub generation: AtomicU64,
    pub discovered: RwLock<Vec<TagInfo>>,
    pub session: ArcSwapOption<Session>,
    /// 生命周期锁：串行化同一 PLC 的 connect / disconnect
    pub poller: tokio::sync::Mutex<Option<PollerHandle>>,
    pub retry: Mutex<Option<PendingRetry>>,
    pub retry_seq: AtomicU64,
    pub retry_attempts: AtomicU32,
    /// 用户期望保持连接
    pub wanted: AtomicBool,
    pub removed: AtomicBool,
}

impl PlcEntry {
    pub fn new(config: PlcConfig, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            name: config.name.clone(),
            config: ArcSwap::from_pointee(config),
            factory,
            state: RwLock::new(PlcState {
                status: ConnectionStatus::Disconnected,
                last_error: None,
                identity: None,
            }),
            cache: TagCache::default(),
            stats: RwLock::new(PollStats::default()),
            generation: AtomicU64::new(0),
            discovered: RwLock::new(Vec::new()),
            session: ArcSwapOption::from(None),
            poller: tokio::sync::Mutex::new(None),
            retry: Mutex::new(None),
            retry_seq: AtomicU64::new(0),
            retry_attempts: AtomicU32::new(0),
            wanted: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        read_lock(&self.state).status
    }

    pub fn is_wanted(&self) -> bool {
        self.wanted.load(Ordering::SeqCst) && !self.removed.load(Ordering::SeqCst)
    }

    /// 新会话：清空缓存与统计。
    pub fn reset_session_state(&self) {
        self.cache.clear();
        *write_lock(&self.stats) = PollStats::default();
        write_lock(&self.discovered).clear();
        write_lock(&self.state).identity = None;
    }

    /// 标签列表：支持浏览的协议族优先返回浏览结果，否则返回声明的选择。
    pub fn tags(&self) -> Vec<TagInfo> {
        let config = self.config.load();
        if config.family.discovers_tags() {
            let discovered = read_lock(&self.discovered);
            if !discovered.is_empty() {
                return discovered.clone();
            }
        }
        config
            .tags
            .iter()
            .map(|selection| TagInfo {
                name: selection.name.clone(),
                data_type: selection.data_type.clone(),
                writable: selection.writable,
            })
            .collect()
    }

    pub fn take_retry(&self) -> Option<PendingRetry> {
        self.retry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn view(&self) -> PlcView {
        let state = read_lock(&self.state);
        PlcView {
            config: self.config.load_full().as_ref().clone(),
            status: state.status,
            last_error: state.last_error.clone(),
            identity: state.identity.clone(),
            stats: read_lock(&self.stats).clone(),
            tag_count: self.cache.len(),
        }
    }
}
