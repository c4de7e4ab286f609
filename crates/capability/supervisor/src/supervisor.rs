use crate::entry::{PendingRetry, PlcEntry, PollerHandle};
use crate::session::Session;
use crate::{SupervisorError, SupervisorSettings, poller, read_lock, write_lock};
use domain::{
    ConnectionStatus, PlcConfig, PlcEvent, PlcEventKind, PlcView, PollStats, StructureTemplate,
    TagData, TagInfo, TagSelection, TagValue, now_epoch_ms,
};
use futures::future::join_all;
use plcgw_driver::DriverRegistry;
use plcgw_telemetry::{EventLog, GatewayMetrics};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct SupervisorInner {
    registry: DriverRegistry,
    plcs: RwLock<HashMap<String, Arc<PlcEntry>>>,
    events: broadcast::Sender<PlcEvent>,
    log: Arc<dyn EventLog>,
    metrics: Arc<GatewayMetrics>,
    settings: SupervisorSettings,
}

/// PLC 连接监管器。
///
/// 可廉价克隆；所有克隆共享同一组 PLC 条目。
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

impl Supervisor {
    pub fn new(
        registry: DriverRegistry,
        settings: SupervisorSettings,
        log: Arc<dyn EventLog>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            inner: Arc::new(SupervisorInner {
                registry,
                plcs: RwLock::new(HashMap::new()),
                events,
                log,
                metrics,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.inner.metrics
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.inner.log
    }

    /// 订阅 PLC 事件（新增、移除、状态变化、缓存刷新）。
    pub fn subscribe(&self) -> broadcast::Receiver<PlcEvent> {
        self.inner.events.subscribe()
    }

    pub fn contains(&self, name: &str) -> bool {
        read_lock(&self.inner.plcs).contains_key(name)
    }

    fn entry(&self, name: &str) -> Result<Arc<PlcEntry>, SupervisorError> {
        read_lock(&self.inner.plcs)
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownPlc(name.to_string()))
    }

    fn entries(&self) -> Vec<Arc<PlcEntry>> {
        let mut entries: Vec<Arc<PlcEntry>> = read_lock(&self.inner.plcs).values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    // ---- 注册表 ----

    /// 注册 PLC（不连接）。
    pub fn add_plc(&self, config: PlcConfig) -> Result<(), SupervisorError> {
        config.validate().map_err(SupervisorError::InvalidConfig)?;
        let kind = config.family.kind();
        let factory = self
            .inner
            .registry
            .factory(kind)
            .map_err(|err| SupervisorError::InvalidConfig(err.to_string()))?;
        let name = config.name.clone();
        let address = config.address.clone();
        {
            let mut plcs = write_lock(&self.inner.plcs);
            if plcs.contains_key(&name) {
                return Err(SupervisorError::InvalidConfig(format!(
                    "plc {} already exists",
                    name
                )));
            }
            plcs.insert(name.clone(), Arc::new(PlcEntry::new(config, factory)));
        }
        info!(
            target: "plcgw.supervisor",
            plc = %name,
            family = %kind,
            address = %address,
            "plc_added"
        );
        self.emit(&name, PlcEventKind::Added);
        Ok(())
    }

    /// 注销 PLC：停止轮询、关闭会话后移除。
    pub async fn remove_plc(&self, name: &str) -> Result<(), SupervisorError> {
        let entry = write_lock(&self.inner.plcs)
            .remove(name)
            .ok_or_else(|| SupervisorError::UnknownPlc(name.to_string()))?;
        entry.removed.store(true, Ordering::SeqCst);
        entry.wanted.store(false, Ordering::SeqCst);
        self.cancel_retry(&entry);

        let mut poller = entry.poller.lock().await;
        self.stop_session(&entry, &mut poller).await;
        drop(poller);

        self.set_status(&entry, ConnectionStatus::Disconnected, None);
        info!(target: "plcgw.supervisor", plc = %name, "plc_removed");
        self.inner.log.info(name, "removed".to_string());
        self.emit(name, PlcEventKind::Removed);
        Ok(())
    }

    /// 整体替换配置：断开并移除旧条目，注册新条目，原先保持连接且新配置启用时重新连接。
    pub async fn update_plc(&self, name: &str, config: PlcConfig) -> Result<(), SupervisorError> {
        config.validate().map_err(SupervisorError::InvalidConfig)?;
        self.inner
            .registry
            .factory(config.family.kind())
            .map_err(|err| SupervisorError::InvalidConfig(err.to_string()))?;
        let entry = self.entry(name)?;
        if config.name != name && self.contains(&config.name) {
            return Err(SupervisorError::InvalidConfig(format!(
                "plc {} already exists",
                config.name
            )));
        }
        let reconnect = entry.is_wanted() || entry.status().is_active();
        drop(entry);

        self.remove_plc(name).await?;
        let new_name = config.name.clone();
        let enabled = config.enabled;
        self.add_plc(config)?;
        if reconnect && enabled {
            if let Err(err) = self.connect(&new_name).await {
                warn!(
                    target: "plcgw.supervisor",
                    plc = %new_name,
                    error = %err,
                    "plc_reconnect_after_update_failed"
                );
            }
        }
        Ok(())
    }

    /// 替换标签选择并刷新轮询集合，不影响连接状态。
    pub fn update_tags(
        &self,
        name: &str,
        tags: Vec<TagSelection>,
    ) -> Result<Vec<String>, SupervisorError> {
        let entry = self.entry(name)?;
        let mut next = entry.config.load_full().as_ref().clone();
        next.tags = tags;
        next.validate().map_err(SupervisorError::InvalidConfig)?;
        entry.config.store(Arc::new(next));
        self.refresh_manual_tags(name)
    }

    /// 按当前声明的选择重新推导轮询集合，并清理不再声明的缓存条目。
    pub fn refresh_manual_tags(&self, name: &str) -> Result<Vec<String>, SupervisorError> {
        let entry = self.entry(name)?;
        let polled = entry.config.load().polled_tags();
        let keep: HashSet<String> = polled.iter().cloned().collect();
        entry.cache.retain(&keep);
        info!(
            target: "plcgw.supervisor",
            plc = %name,
            tags = polled.len(),
            "manual_tags_refreshed"
        );
        Ok(polled)
    }

    // ---- 生命周期 ----

    /// 建立连接并启动轮询；已连接或连接中时直接返回。
    pub async fn connect(&self, name: &str) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        entry.wanted.store(true, Ordering::SeqCst);
        self.cancel_retry(&entry);
        entry.retry_attempts.store(0, Ordering::SeqCst);
        self.connect_entry(&entry, false).await
    }

    async fn connect_entry(
        &self,
        entry: &Arc<PlcEntry>,
        from_retry: bool,
    ) -> Result<(), SupervisorError> {
        let mut poller = entry.poller.lock().await;
        if entry.removed.load(Ordering::SeqCst) {
            return Err(SupervisorError::UnknownPlc(entry.name.clone()));
        }
        if from_retry && !entry.is_wanted() {
            return Ok(());
        }
        if entry.status().is_active() {
            return Ok(());
        }
        self.stop_session(entry, &mut poller).await;

        let config = entry.config.load_full();
        self.set_status(entry, ConnectionStatus::Connecting, None);
        entry.reset_session_state();
        info!(
            target: "plcgw.supervisor",
            plc = %entry.name,
            address = %config.address,
            family = %config.family.kind(),
            "plc_connecting"
        );

        let driver = match entry.factory.create(&config) {
            Ok(driver) => driver,
            Err(err) => return Err(self.connect_failed(entry, err.into())),
        };
        let limit = config.timeout();
        match timeout(limit, driver.connect(&config.address, limit)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(self.connect_failed(entry, err.into())),
            Err(_) => {
                return Err(self.connect_failed(
                    entry,
                    SupervisorError::Timeout(format!(
                        "connect to {} exceeded {} ms",
                        config.address,
                        limit.as_millis()
                    )),
                ));
            }
        }

        if let Ok(Ok(Some(identity))) = timeout(limit, driver.device_info()).await {
            write_lock(&entry.state).identity = Some(identity);
        }
        if config.family.discovers_tags() {
            match timeout(limit, driver.discover_tags()).await {
                Ok(Ok(tags)) => *write_lock(&entry.discovered) = tags,
                Ok(Err(err)) => warn!(
                    target: "plcgw.supervisor",
                    plc = %entry.name,
                    error = %err,
                    "tag_discovery_failed"
                ),
                Err(_) => warn!(
                    target: "plcgw.supervisor",
                    plc = %entry.name,
                    "tag_discovery_timeout"
                ),
            }
        }

        let session = Arc::new(Session::new(driver));
        entry.session.store(Some(session.clone()));
        entry.retry_attempts.store(0, Ordering::SeqCst);
        self.inner.metrics.record_connect(true);
        self.set_status(entry, ConnectionStatus::Connected, None);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller::run(
            self.clone(),
            entry.clone(),
            session,
            cancel.clone(),
        ));
        *poller = Some(PollerHandle { cancel, handle });

        info!(
            target: "plcgw.supervisor",
            plc = %entry.name,
            address = %config.address,
            polled_tags = config.polled_tags().len(),
            poll_rate_ms = config.poll_rate().as_millis() as u64,
            "plc_connected"
        );
        self.inner
            .log
            .info(&entry.name, format!("connected to {}", config.address));
        Ok(())
    }

    fn connect_failed(&self, entry: &Arc<PlcEntry>, err: SupervisorError) -> SupervisorError {
        let message = err.to_string();
        self.inner.metrics.record_connect(false);
        self.set_status(entry, ConnectionStatus::Error, Some(message.clone()));
        warn!(
            target: "plcgw.supervisor",
            plc = %entry.name,
            error = %message,
            "plc_connect_failed"
        );
        self.inner
            .log
            .error(&entry.name, format!("connect failed: {}", message));
        self.schedule_reconnect(entry);
        err
    }

    /// 停止轮询、关闭会话；幂等，并取消待执行的重连。
    pub async fn disconnect(&self, name: &str) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        entry.wanted.store(false, Ordering::SeqCst);
        self.cancel_retry(&entry);

        let mut poller = entry.poller.lock().await;
        self.stop_session(&entry, &mut poller).await;
        drop(poller);

        if entry.status() != ConnectionStatus::Disconnected {
            entry.cache.mark_offline(
                &format!("plc {} is {}", name, ConnectionStatus::Disconnected),
                now_epoch_ms(),
            );
            self.set_status(&entry, ConnectionStatus::Disconnected, None);
            info!(target: "plcgw.supervisor", plc = %name, "plc_disconnected");
            self.inner.log.info(name, "disconnected".to_string());
        }
        Ok(())
    }

    async fn stop_session(&self, entry: &PlcEntry, poller: &mut Option<PollerHandle>) {
        if let Some(running) = poller.take() {
            running.cancel.cancel();
            let _ = running.handle.await;
        }
        let limit = entry.config.load().timeout();
        if let Some(session) = entry.session.swap(None) {
            session.close(limit).await;
        }
    }

    /// 连接所有启用的 PLC，返回连接成功的数量。
    pub async fn connect_enabled(&self) -> usize {
        let entries: Vec<Arc<PlcEntry>> = self
            .entries()
            .into_iter()
            .filter(|entry| entry.config.load().enabled)
            .collect();
        let results = join_all(entries.iter().map(|entry| {
            entry.wanted.store(true, Ordering::SeqCst);
            self.connect_entry(entry, false)
        }))
        .await;
        results.iter().filter(|result| result.is_ok()).count()
    }

    /// 断开全部 PLC。
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.entries().iter().map(|entry| entry.name.clone()).collect();
        join_all(names.iter().map(|name| self.disconnect(name))).await;
        info!(target: "plcgw.supervisor", plcs = names.len(), "supervisor_shutdown");
    }

    // ---- 重连 ----

    fn schedule_reconnect(&self, entry: &Arc<PlcEntry>) {
        let policy = &self.inner.settings.reconnect;
        if !policy.enabled || !entry.is_wanted() {
            return;
        }
        let mut slot = entry
            .retry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return;
        }
        let attempt = entry.retry_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = policy.delay_for(attempt);
        let id = entry.retry_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *slot = Some(PendingRetry {
            id,
            cancel: cancel.clone(),
        });
        drop(slot);

        info!(
            target: "plcgw.supervisor",
            plc = %entry.name,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "reconnect_scheduled"
        );
        self.inner.log.warn(
            &entry.name,
            format!("reconnect scheduled in {} ms", delay.as_millis()),
        );

        let weak = Arc::downgrade(&self.inner);
        let entry = entry.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let mut slot = entry
                    .retry
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if slot.as_ref().map(|pending| pending.id) != Some(id) {
                    return;
                }
                *slot = None;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let supervisor = Supervisor { inner };
            let _ = supervisor.connect_entry(&entry, true).await;
        });
    }

    fn cancel_retry(&self, entry: &PlcEntry) {
        if let Some(pending) = entry.take_retry() {
            pending.cancel.cancel();
        }
    }

    // ---- 状态 ----

    pub(crate) fn emit(&self, plc: &str, kind: PlcEventKind) {
        let _ = self.inner.events.send(PlcEvent {
            plc: plc.to_string(),
            kind,
        });
    }

    fn set_status(&self, entry: &PlcEntry, status: ConnectionStatus, error: Option<String>) {
        let previous = {
            let mut state = write_lock(&entry.state);
            let previous = state.status;
            state.status = status;
            state.last_error = error;
            previous
        };
        if previous != status {
            self.emit(&entry.name, PlcEventKind::StatusChanged(status));
        }
    }

    /// 记录错误但不改变状态。
    pub(crate) fn record_error(&self, entry: &PlcEntry, message: String) {
        write_lock(&entry.state).last_error = Some(message);
    }

    /// 轮询器在连续失败达到阈值后调用。
    pub(crate) fn demote(&self, entry: &Arc<PlcEntry>, message: String) {
        entry.cache.mark_offline(
            &format!("plc {} is {}", entry.name, ConnectionStatus::Error),
            now_epoch_ms(),
        );
        self.set_status(entry, ConnectionStatus::Error, Some(message.clone()));
        error!(
            target: "plcgw.supervisor",
            plc = %entry.name,
            error = %message,
            "plc_demoted"
        );
        self.inner.log.error(
            &entry.name,
            format!(
                "demoted to error after {} consecutive poll failures",
                self.inner.settings.failure_threshold
            ),
        );
        self.schedule_reconnect(entry);
    }

    // ---- 访问器 ----

    pub fn list_plcs(&self) -> Vec<PlcView> {
        self.entries().iter().map(|entry| entry.view()).collect()
    }

    pub fn get_plc(&self, name: &str) -> Result<PlcView, SupervisorError> {
        Ok(self.entry(name)?.view())
    }

    pub fn get_status(&self, name: &str) -> Result<ConnectionStatus, SupervisorError> {
        Ok(self.entry(name)?.status())
    }

    pub fn last_error(&self, name: &str) -> Result<Option<String>, SupervisorError> {
        let entry = self.entry(name)?;
        let error = read_lock(&entry.state).last_error.clone();
        Ok(error)
    }

    /// 全部 PLC 的汇总轮询统计。
    pub fn poll_stats(&self) -> PollStats {
        let mut total = PollStats::default();
        for entry in self.entries() {
            total.merge(&read_lock(&entry.stats));
        }
        total
    }

    pub fn plc_poll_stats(&self, name: &str) -> Result<PollStats, SupervisorError> {
        let entry = self.entry(name)?;
        let stats = read_lock(&entry.stats).clone();
        Ok(stats)
    }

    pub fn get_tags(&self, name: &str) -> Result<Vec<TagInfo>, SupervisorError> {
        Ok(self.entry(name)?.tags())
    }

    pub fn get_values(&self, name: &str) -> Result<HashMap<String, TagValue>, SupervisorError> {
        Ok(self.entry(name)?.cache.snapshot())
    }

    pub fn get_value(&self, name: &str, tag: &str) -> Result<Option<TagValue>, SupervisorError> {
        Ok(self.entry(name)?.cache.get(tag))
    }

    /// 已完成的缓存写入次数。
    pub fn generation(&self, name: &str) -> Result<u64, SupervisorError> {
        Ok(self.entry(name)?.generation.load(Ordering::SeqCst))
    }

    // ---- 写入与模板 ----

    fn live_session(&self, entry: &PlcEntry) -> Result<Arc<Session>, SupervisorError> {
        if entry.status() != ConnectionStatus::Connected {
            return Err(SupervisorError::NotConnected(entry.name.clone()));
        }
        entry
            .session
            .load_full()
            .ok_or_else(|| SupervisorError::NotConnected(entry.name.clone()))
    }

    /// 单点写（内部调用，如触发器回执），不检查标签的 writable 选择。
    pub async fn write_tag(
        &self,
        name: &str,
        tag: &str,
        value: TagData,
    ) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        let session = self.live_session(&entry)?;
        let limit = entry.config.load().timeout();
        let result = session.write(tag, &value, limit).await;
        match &result {
            Ok(()) => info!(
                target: "plcgw.supervisor",
                plc = %name,
                tag = %tag,
                value = %value,
                "tag_written"
            ),
            Err(err) => {
                warn!(
                    target: "plcgw.supervisor",
                    plc = %name,
                    tag = %tag,
                    error = %err,
                    "tag_write_failed"
                );
                self.inner
                    .log
                    .warn(name, format!("write {} failed: {}", tag, err));
            }
        }
        result
    }

    /// 用户发起的单点写：标签必须已声明且可写。
    pub async fn write_user_tag(
        &self,
        name: &str,
        tag: &str,
        value: TagData,
    ) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        let writable = entry
            .config
            .load()
            .selection(tag)
            .is_some_and(|selection| selection.writable);
        if !writable {
            return Err(SupervisorError::NotWritable(format!("{}.{}", name, tag)));
        }
        self.write_tag(name, tag, value).await
    }

    pub async fn get_template(
        &self,
        name: &str,
        type_code: u16,
    ) -> Result<StructureTemplate, SupervisorError> {
        let entry = self.entry(name)?;
        let session = self.live_session(&entry)?;
        let limit = entry.config.load().timeout();
        session.template(type_code, limit).await
    }
}
