use crate::access::PlcAccess;
use crate::condition;
use crate::error::TriggerError;
use crate::payload::{DataEntry, EventPayload, data_key};
use crate::slot::{Fault, TriggerRuntime, TriggerSlot};
use crate::{EngineSettings, FireReport, TriggerTransition, read_lock, write_lock};
use arc_swap::ArcSwap;
use domain::{
    ConnectionStatus, DataSource, PlcEvent, PlcEventKind, SinkSelector, TagData, TagPack,
    TriggerConfig, TriggerStatus, TriggerStatusView, now_epoch_ms,
};
use futures::future::join_all;
use plcgw_sink::{DestinationClass, EventMessage, PublishSink};
use plcgw_telemetry::{EventLog, GatewayMetrics};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 触发规则引擎。
///
/// 每个触发器的评估与触发互斥执行；不同触发器之间并行。
#[derive(Clone)]
pub struct TriggerEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    plcs: Arc<dyn PlcAccess>,
    sinks: Arc<dyn PublishSink>,
    settings: EngineSettings,
    log: Arc<dyn EventLog>,
    metrics: Arc<GatewayMetrics>,
    triggers: RwLock<HashMap<String, Arc<TriggerSlot>>>,
    packs: ArcSwap<HashMap<String, TagPack>>,
    transitions: broadcast::Sender<TriggerTransition>,
    shutdown: CancellationToken,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerEngine {
    pub fn new(
        plcs: Arc<dyn PlcAccess>,
        sinks: Arc<dyn PublishSink>,
        settings: EngineSettings,
        log: Arc<dyn EventLog>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let (transitions, _) = broadcast::channel(settings.transition_capacity.max(1));
        Self {
            inner: Arc::new(EngineInner {
                plcs,
                sinks,
                settings,
                log,
                metrics,
                triggers: RwLock::new(HashMap::new()),
                packs: ArcSwap::from_pointee(HashMap::new()),
                transitions,
                shutdown: CancellationToken::new(),
                router: Mutex::new(None),
            }),
        }
    }

    /// 启动 PLC 事件路由（重复调用无副作用）。
    pub fn start(&self) {
        let mut router = self
            .inner
            .router
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if router.is_some() {
            return;
        }
        let events = self.inner.plcs.subscribe();
        let cancel = self.inner.shutdown.child_token();
        *router = Some(tokio::spawn(run_router(
            Arc::downgrade(&self.inner),
            events,
            cancel,
        )));
        info!(target: "plcgw.trigger", "trigger_engine_started");
    }

    /// 停止路由与全部评估任务，等待进行中的触发完成。
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let router = self
            .inner
            .router
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = router {
            let _ = handle.await;
        }
        let slots: Vec<Arc<TriggerSlot>> = read_lock(&self.inner.triggers).values().cloned().collect();
        for slot in slots {
            if let Some(handle) = slot.take_worker() {
                let _ = handle.await;
            }
        }
        info!(target: "plcgw.trigger", "trigger_engine_stopped");
    }

    /// 订阅触发器状态迁移。
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerTransition> {
        self.inner.transitions.subscribe()
    }

    pub fn contains(&self, name: &str) -> bool {
        read_lock(&self.inner.triggers).contains_key(name)
    }

    /// 注册触发器并启动其评估任务。
    pub fn add_trigger(&self, config: TriggerConfig) -> Result<(), TriggerError> {
        self.inner.check(&config)?;
        let name = config.name.clone();
        let slot = {
            let mut triggers = write_lock(&self.inner.triggers);
            if triggers.contains_key(&name) {
                return Err(TriggerError::AlreadyExists(name));
            }
            let slot = Arc::new(TriggerSlot::new(config, self.inner.shutdown.child_token()));
            triggers.insert(name.clone(), slot.clone());
            slot
        };
        self.inner.spawn_worker(&slot);
        info!(target: "plcgw.trigger", trigger = %name, "trigger_added");
        self.inner.log.info(&name, "trigger added".to_string());
        Ok(())
    }

    /// 移除触发器；进行中的触发会先执行完。
    pub async fn remove_trigger(&self, name: &str) -> Result<(), TriggerError> {
        let slot = write_lock(&self.inner.triggers)
            .remove(name)
            .ok_or_else(|| TriggerError::UnknownTrigger(name.to_string()))?;
        {
            let _exec = slot.exec.lock().await;
            slot.cancel.cancel();
        }
        if let Some(handle) = slot.take_worker() {
            let _ = handle.await;
        }
        info!(target: "plcgw.trigger", trigger = %name, "trigger_removed");
        self.inner.log.info(name, "trigger removed".to_string());
        Ok(())
    }

    /// 替换触发器配置。
    ///
    /// 源 PLC 或触发标签变化时清空历史；否则保留计数与基线。
    pub async fn update_trigger(&self, name: &str, config: TriggerConfig) -> Result<(), TriggerError> {
        self.inner.check(&config)?;
        let slot = self.inner.slot(name)?;
        let _exec = slot.exec.lock().await;
        if config.name != name {
            let mut triggers = write_lock(&self.inner.triggers);
            if triggers.contains_key(&config.name) {
                return Err(TriggerError::AlreadyExists(config.name));
            }
            let Some(existing) = triggers.remove(name) else {
                return Err(TriggerError::UnknownTrigger(name.to_string()));
            };
            triggers.insert(config.name.clone(), existing);
        }

        let previous = slot.config();
        let reset = !previous.same_source(&config);
        let enabled = config.enabled;
        let renamed = config.name.clone();
        slot.config.store(Arc::new(config));
        {
            let mut runtime = write_lock(&slot.runtime);
            if reset {
                let mut fresh = TriggerRuntime::new(enabled);
                let target = fresh.status;
                fresh.status = runtime.status;
                *runtime = fresh;
                self.inner.transition(&renamed, &mut runtime, target);
            } else if !enabled {
                runtime.clear_baseline();
                self.inner.transition(&renamed, &mut runtime, TriggerStatus::Disabled);
            } else if runtime.status == TriggerStatus::Disabled {
                runtime.clear_baseline();
                self.inner.transition(&renamed, &mut runtime, TriggerStatus::Armed);
            }
        }
        drop(_exec);
        slot.nudge();
        info!(target: "plcgw.trigger", trigger = %renamed, reset, "trigger_updated");
        self.inner.log.info(&renamed, "trigger updated".to_string());
        Ok(())
    }

    /// 重新布防（清空基线与故障）。
    pub async fn start_trigger(&self, name: &str) -> Result<(), TriggerError> {
        let slot = self.inner.slot(name)?;
        {
            let _exec = slot.exec.lock().await;
            let mut next = TriggerConfig::clone(&slot.config());
            next.enabled = true;
            slot.config.store(Arc::new(next));
            let mut runtime = write_lock(&slot.runtime);
            runtime.clear_baseline();
            runtime.last_error = None;
            self.inner.transition(name, &mut runtime, TriggerStatus::Armed);
        }
        slot.nudge();
        self.inner.log.info(name, "trigger started".to_string());
        Ok(())
    }

    /// 停止评估（进入 Disabled）。
    pub async fn stop_trigger(&self, name: &str) -> Result<(), TriggerError> {
        let slot = self.inner.slot(name)?;
        {
            let _exec = slot.exec.lock().await;
            let mut next = TriggerConfig::clone(&slot.config());
            next.enabled = false;
            slot.config.store(Arc::new(next));
            let mut runtime = write_lock(&slot.runtime);
            runtime.clear_baseline();
            self.inner.transition(name, &mut runtime, TriggerStatus::Disabled);
        }
        slot.nudge();
        self.inner.log.info(name, "trigger stopped".to_string());
        Ok(())
    }

    /// 不论条件与状态执行一次触发；不改变状态，不影响去抖与冷却。
    pub async fn test_fire_trigger(&self, name: &str) -> Result<FireReport, TriggerError> {
        let slot = self.inner.slot(name)?;
        let _exec = slot.exec.lock().await;
        let config = slot.config();
        let value = self
            .inner
            .plcs
            .value(&config.plc, &config.tag)
            .and_then(|value| value.current().cloned());
        let sequence = read_lock(&slot.runtime).fire_count + 1;
        let report = self.inner.fire(&config, value.as_ref(), sequence, true).await;
        let mut runtime = write_lock(&slot.runtime);
        runtime.fire_count += 1;
        runtime.last_fire_ms = Some(now_epoch_ms());
        if let Some(error) = report.error() {
            runtime.last_error = Some(error);
        }
        Ok(report)
    }

    /// 立即评估一次并返回状态。
    pub async fn evaluate(&self, name: &str) -> Result<TriggerStatusView, TriggerError> {
        let slot = self.inner.slot(name)?;
        self.inner.evaluate(&slot).await;
        slot.nudge();
        Ok(slot.view())
    }

    pub fn list_triggers(&self) -> Vec<TriggerConfig> {
        let mut configs: Vec<TriggerConfig> = read_lock(&self.inner.triggers)
            .values()
            .map(|slot| TriggerConfig::clone(&slot.config()))
            .collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    pub fn get_trigger(&self, name: &str) -> Result<TriggerConfig, TriggerError> {
        Ok(TriggerConfig::clone(&self.inner.slot(name)?.config()))
    }

    pub fn get_trigger_status(&self, name: &str) -> Result<TriggerStatusView, TriggerError> {
        Ok(self.inner.slot(name)?.view())
    }

    pub fn list_statuses(&self) -> Vec<TriggerStatusView> {
        let mut views: Vec<TriggerStatusView> = read_lock(&self.inner.triggers)
            .values()
            .map(|slot| slot.view())
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    /// 新增或替换标签包。
    pub fn set_pack(&self, pack: TagPack) -> Result<(), TriggerError> {
        if pack.name.trim().is_empty() {
            return Err(TriggerError::InvalidConfig("pack name is empty".to_string()));
        }
        if pack.members.is_empty() {
            return Err(TriggerError::InvalidConfig(format!(
                "pack {} has no members",
                pack.name
            )));
        }
        for member in &pack.members {
            if member.tag.trim().is_empty() {
                return Err(TriggerError::InvalidConfig(format!(
                    "pack {} has a member with empty tag",
                    pack.name
                )));
            }
            if !self.inner.plcs.contains(&member.plc) {
                return Err(TriggerError::UnknownPlc(member.plc.clone()));
            }
        }
        self.inner.packs.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(pack.name.clone(), pack.clone());
            next
        });
        debug!(target: "plcgw.trigger", pack = %pack.name, members = pack.members.len(), "pack_set");
        Ok(())
    }

    /// 删除标签包；仍被触发器引用时拒绝。
    pub fn remove_pack(&self, name: &str) -> Result<(), TriggerError> {
        let users: Vec<String> = read_lock(&self.inner.triggers)
            .values()
            .map(|slot| slot.config())
            .filter(|config| {
                config
                    .data
                    .iter()
                    .any(|source| matches!(source, DataSource::Pack { pack } if pack == name))
            })
            .map(|config| config.name.clone())
            .collect();
        if let Some(user) = users.first() {
            return Err(TriggerError::InvalidConfig(format!(
                "pack {} is used by trigger {}",
                name, user
            )));
        }
        if !self.inner.packs.load().contains_key(name) {
            return Err(TriggerError::UnknownPack(name.to_string()));
        }
        self.inner.packs.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(name);
            next
        });
        Ok(())
    }

    pub fn list_packs(&self) -> Vec<TagPack> {
        let mut packs: Vec<TagPack> = self.inner.packs.load().values().cloned().collect();
        packs.sort_by(|a, b| a.name.cmp(&b.name));
        packs
    }
}

impl EngineInner {
    fn slot(&self, name: &str) -> Result<Arc<TriggerSlot>, TriggerError> {
        read_lock(&self.triggers)
            .get(name)
            .cloned()
            .ok_or_else(|| TriggerError::UnknownTrigger(name.to_string()))
    }

    /// 校验字段与跨实体引用。
    fn check(&self, config: &TriggerConfig) -> Result<(), TriggerError> {
        config.validate().map_err(TriggerError::InvalidConfig)?;
        for plc in config.referenced_plcs() {
            if !self.plcs.contains(plc) {
                return Err(TriggerError::UnknownPlc(plc.to_string()));
            }
        }
        let packs = self.packs.load();
        for source in &config.data {
            if let DataSource::Pack { pack } = source {
                if !packs.contains_key(pack) {
                    return Err(TriggerError::UnknownPack(pack.clone()));
                }
            }
        }
        for (class, selector) in [
            (DestinationClass::Mqtt, &config.mqtt),
            (DestinationClass::Kafka, &config.kafka),
        ] {
            if let SinkSelector::Named(name) = selector {
                if !self.sinks.destinations(class).contains(name) {
                    return Err(TriggerError::UnknownDestination(format!("{}:{}", class, name)));
                }
            }
        }
        Ok(())
    }

    fn spawn_worker(self: &Arc<Self>, slot: &Arc<TriggerSlot>) {
        let handle = tokio::spawn(run_worker(
            Arc::downgrade(self),
            slot.clone(),
            slot.signal.subscribe(),
        ));
        slot.set_worker(handle);
    }

    fn nudge_plc(&self, plc: &str) {
        for slot in read_lock(&self.triggers).values() {
            if slot.config.load().plc == plc {
                slot.nudge();
            }
        }
    }

    fn nudge_all(&self) {
        for slot in read_lock(&self.triggers).values() {
            slot.nudge();
        }
    }

    fn transition(&self, name: &str, runtime: &mut TriggerRuntime, next: TriggerStatus) {
        let from = runtime.status;
        if from == next {
            return;
        }
        debug_assert!(
            from.can_transition_to(next),
            "illegal trigger transition {} -> {}",
            from,
            next
        );
        runtime.status = next;
        let _ = self.transitions.send(TriggerTransition {
            trigger: name.to_string(),
            from,
            to: next,
        });
        debug!(target: "plcgw.trigger", trigger = %name, from = %from, to = %next, "trigger_transition");
    }

    fn fault(&self, name: &str, runtime: &mut TriggerRuntime, fault: Fault, reason: String) {
        let repeated = runtime.status == TriggerStatus::Error
            && runtime.last_error.as_deref() == Some(reason.as_str());
        runtime.fault = Some(fault);
        runtime.cooldown_until = None;
        runtime.last_error = Some(reason.clone());
        self.transition(name, runtime, TriggerStatus::Error);
        if !repeated {
            warn!(target: "plcgw.trigger", trigger = %name, error = %reason, "trigger_error");
            self.log.warn(name, reason);
        }
    }

    /// 读取触发标签的当前可信值。
    fn sample(&self, config: &TriggerConfig) -> Result<TagData, String> {
        match self.plcs.status(&config.plc) {
            None => return Err(format!("plc {} is not registered", config.plc)),
            Some(ConnectionStatus::Connected) => {}
            Some(status) => return Err(format!("plc {} is {}", config.plc, status)),
        }
        let value = self
            .plcs
            .value(&config.plc, &config.tag)
            .ok_or_else(|| format!("tag {} has no cached value", config.tag))?;
        if let Some(error) = value.error {
            return Err(format!("tag {} read failed: {}", config.tag, error));
        }
        value
            .data
            .ok_or_else(|| format!("tag {} has no value", config.tag))
    }

    async fn evaluate(&self, slot: &TriggerSlot) {
        let _exec = slot.exec.lock().await;
        if slot.cancel.is_cancelled() {
            return;
        }
        let config = slot.config();
        let name = config.name.as_str();
        let now = Instant::now();
        let sample = self.sample(&config);

        let (value, sequence) = {
            let mut runtime = write_lock(&slot.runtime);
            match runtime.status {
                TriggerStatus::Disabled | TriggerStatus::Firing => return,
                TriggerStatus::Cooldown => {
                    let cooling = runtime.cooldown_until.is_some_and(|until| now < until);
                    if cooling && self.plcs.contains(&config.plc) {
                        note_quiet_sample(&config, &sample, &mut runtime);
                        return;
                    }
                    if !cooling {
                        runtime.cooldown_until = None;
                        self.transition(name, &mut runtime, TriggerStatus::Armed);
                    }
                }
                TriggerStatus::Error => {
                    if let Some(Fault::AckWrite { until }) = runtime.fault {
                        if now < until {
                            note_quiet_sample(&config, &sample, &mut runtime);
                            return;
                        }
                    }
                }
                TriggerStatus::Armed => {}
            }

            let value = match sample {
                Ok(value) => value,
                Err(reason) => {
                    self.fault(name, &mut runtime, Fault::Source, reason);
                    return;
                }
            };
            let holds = match condition::evaluate(&config.condition, &value, runtime.last_value.as_ref()) {
                Ok(holds) => holds,
                Err(reason) => {
                    runtime.last_value = Some(value);
                    self.fault(name, &mut runtime, Fault::Condition, reason);
                    return;
                }
            };

            if runtime.status == TriggerStatus::Error {
                if matches!(runtime.fault, Some(Fault::Source | Fault::Condition)) {
                    runtime.last_error = None;
                }
                runtime.fault = None;
                self.transition(name, &mut runtime, TriggerStatus::Armed);
                info!(target: "plcgw.trigger", trigger = %name, "trigger_rearmed");
            }

            let previous = runtime.last_condition.replace(holds);
            runtime.last_value = Some(value.clone());
            let edge = if config.condition.operator.is_edge() {
                holds
            } else {
                holds && previous == Some(false)
            };
            if !edge {
                return;
            }
            if let Some(started) = runtime.last_fire_started {
                if now.duration_since(started) < config.debounce() {
                    self.metrics.record_fire_suppressed();
                    debug!(target: "plcgw.trigger", trigger = %name, "fire_debounced");
                    return;
                }
            }
            runtime.last_fire_started = Some(now);
            self.transition(name, &mut runtime, TriggerStatus::Firing);
            (value, runtime.fire_count + 1)
        };

        let report = self.fire(&config, Some(&value), sequence, false).await;

        let mut runtime = write_lock(&slot.runtime);
        runtime.fire_count += 1;
        runtime.last_fire_ms = Some(now_epoch_ms());
        runtime.last_error = report.error();
        let until = Instant::now() + config.effective_cooldown();
        if report.ack_error.is_some() && config.ack_failure_fatal {
            runtime.fault = Some(Fault::AckWrite { until });
            self.transition(name, &mut runtime, TriggerStatus::Error);
        } else {
            runtime.cooldown_until = Some(until);
            self.transition(name, &mut runtime, TriggerStatus::Cooldown);
        }
    }

    /// 触发主体：组装负载、并发发布、回执写回。
    async fn fire(
        &self,
        config: &TriggerConfig,
        value: Option<&TagData>,
        sequence: u64,
        test: bool,
    ) -> FireReport {
        let event_id = Uuid::new_v4().to_string();
        let mut report = FireReport {
            event_id: event_id.clone(),
            ..FireReport::default()
        };
        let data = self.collect_data(config, &mut report.failures);
        let payload = EventPayload {
            event_id: &event_id,
            trigger: &config.name,
            plc: &config.plc,
            tag: &config.tag,
            value,
            timestamp_ms: now_epoch_ms(),
            sequence,
            test,
            selector: config.publish_key(),
            data: &data,
        };

        match serde_json::to_vec(&payload) {
            Ok(bytes) => {
                let message = EventMessage {
                    trigger: config.name.clone(),
                    key: config.publish_key().to_string(),
                    payload: bytes,
                };
                let message = &message;
                let limit = self.settings.dispatch_timeout;
                let results = join_all(self.targets(config).into_iter().map(|(class, name)| async move {
                    let label = format!("{}:{}", class, name);
                    let outcome = match timeout(limit, self.sinks.publish(class, &name, message)).await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(err)) => Err(err.to_string()),
                        Err(_) => Err(format!("publish timeout after {}ms", limit.as_millis())),
                    };
                    (label, outcome)
                }))
                .await;
                for (label, outcome) in results {
                    self.metrics.record_dispatch(outcome.is_ok());
                    match outcome {
                        Ok(()) => report.delivered.push(label),
                        Err(err) => report.failures.push(format!("{}: {}", label, err)),
                    }
                }
            }
            Err(err) => report
                .failures
                .push(format!("payload encode failed: {}", err)),
        }

        if let Some(ack_tag) = &config.ack_tag {
            let code = if report.failures.is_empty() { 1 } else { -1 };
            match self
                .plcs
                .write_tag(&config.plc, ack_tag, TagData::Int(code))
                .await
            {
                Ok(()) => report.ack = Some(code),
                Err(err) => {
                    self.metrics.record_ack_failure();
                    report.ack_error = Some(format!("ack write {} failed: {}", ack_tag, err));
                }
            }
        }

        self.metrics.record_trigger_fire();
        match report.error() {
            None => {
                info!(
                    target: "plcgw.trigger",
                    trigger = %config.name,
                    event_id = %report.event_id,
                    sequence,
                    test,
                    delivered = report.delivered.len(),
                    "trigger_fired"
                );
                self.log.info(
                    &config.name,
                    format!(
                        "fired #{} to {} destination(s)",
                        sequence,
                        report.delivered.len()
                    ),
                );
            }
            Some(error) => {
                warn!(
                    target: "plcgw.trigger",
                    trigger = %config.name,
                    event_id = %report.event_id,
                    sequence,
                    test,
                    delivered = report.delivered.len(),
                    error = %error,
                    "trigger_fire_failed"
                );
                self.log
                    .warn(&config.name, format!("fire #{} failed: {}", sequence, error));
            }
        }
        report
    }

    /// 展开附带数据（标签包按成员顺序展开）。
    fn collect_data(&self, config: &TriggerConfig, failures: &mut Vec<String>) -> Vec<DataEntry> {
        let packs = self.packs.load();
        let mut data = Vec::new();
        for source in &config.data {
            match source {
                DataSource::Tag { plc, tag, alias } => {
                    let plc = plc.as_deref().unwrap_or(&config.plc);
                    data.push(self.data_entry(plc, tag, alias.as_deref(), &config.plc));
                }
                DataSource::Pack { pack } => match packs.get(pack) {
                    Some(pack) => {
                        for member in &pack.members {
                            data.push(self.data_entry(
                                &member.plc,
                                &member.tag,
                                member.alias.as_deref(),
                                &config.plc,
                            ));
                        }
                    }
                    None => failures.push(format!("pack {} not found", pack)),
                },
            }
        }
        data
    }

    fn data_entry(&self, plc: &str, tag: &str, alias: Option<&str>, trigger_plc: &str) -> DataEntry {
        let key = data_key(alias, plc, tag, trigger_plc);
        match self.plcs.value(plc, tag) {
            Some(value) => DataEntry {
                key,
                plc: plc.to_string(),
                tag: tag.to_string(),
                value: value.current().cloned(),
                error: value.error.clone(),
                updated_at_ms: Some(value.updated_at_ms),
            },
            None => DataEntry {
                key,
                plc: plc.to_string(),
                tag: tag.to_string(),
                value: None,
                error: Some("no cached value".to_string()),
                updated_at_ms: None,
            },
        }
    }

    /// 按选择器解析发布目标。
    fn targets(&self, config: &TriggerConfig) -> Vec<(DestinationClass, String)> {
        let mut targets = Vec::new();
        for (class, selector) in [
            (DestinationClass::Mqtt, &config.mqtt),
            (DestinationClass::Kafka, &config.kafka),
        ] {
            match selector {
                SinkSelector::All => targets.extend(
                    self.sinks
                        .destinations(class)
                        .into_iter()
                        .map(|name| (class, name)),
                ),
                SinkSelector::None => {}
                SinkSelector::Named(name) => targets.push((class, name.clone())),
            }
        }
        targets
    }
}

/// 静默期（冷却或回执故障保持）内只记录电平条件的回落。
///
/// 期间出现的 false → true 在静默结束时按边沿处理；持续为真不会再次触发。
fn note_quiet_sample(
    config: &TriggerConfig,
    sample: &Result<TagData, String>,
    runtime: &mut TriggerRuntime,
) {
    if config.condition.operator.is_edge() {
        return;
    }
    let Ok(value) = sample else {
        return;
    };
    if let Ok(false) = condition::evaluate(&config.condition, value, runtime.last_value.as_ref()) {
        runtime.last_condition = Some(false);
        runtime.last_value = Some(value.clone());
    }
}

/// 连接中/已连接不唤醒：首轮轮询完成后的 Refreshed 才有数据。
fn wakes_triggers(kind: &PlcEventKind) -> bool {
    !matches!(
        kind,
        PlcEventKind::StatusChanged(ConnectionStatus::Connecting | ConnectionStatus::Connected)
    )
}

async fn run_router(
    engine: Weak<EngineInner>,
    mut events: broadcast::Receiver<PlcEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(inner) = engine.upgrade() else {
            break;
        };
        match event {
            Ok(event) => {
                if wakes_triggers(&event.kind) {
                    inner.nudge_plc(&event.plc);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "plcgw.trigger", skipped, "plc_events_lagged");
                inner.nudge_all();
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!(target: "plcgw.trigger", "router_stopped");
}

async fn run_worker(
    engine: Weak<EngineInner>,
    slot: Arc<TriggerSlot>,
    mut signal: watch::Receiver<u64>,
) {
    let cancel = slot.cancel.clone();
    match engine.upgrade() {
        Some(inner) => inner.evaluate(&slot).await,
        None => return,
    }
    loop {
        let wake = slot.wake_at();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = signal.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep_until_opt(wake) => {}
        }
        let Some(inner) = engine.upgrade() else {
            break;
        };
        inner.evaluate(&slot).await;
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
