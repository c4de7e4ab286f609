//! 网关门面
//!
//! 配置编辑先在运行时校验并生效，再写入配置存储；持久化失败时回滚运行时。
//! 删除操作先持久化再应用。

use domain::{ConnectionStatus, PlcConfig, TagPack, TriggerConfig, TriggerStatus};
use plcgw_sink::SinkError;
use plcgw_store::{ConfigStore, StoreError};
use plcgw_supervisor::{Supervisor, SupervisorError};
use plcgw_trigger::{FireReport, TriggerEngine, TriggerError};
use std::sync::Arc;
use tracing::{info, warn};

/// 网关错误。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),
    #[error("trigger error: {0}")]
    Trigger(#[from] TriggerError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// 启动结果。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub plcs: usize,
    pub triggers: usize,
    pub connected: usize,
    /// 被拒绝的配置项及原因
    pub rejected: Vec<String>,
}

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn ConfigStore>,
    supervisor: Supervisor,
    engine: TriggerEngine,
}

impl Gateway {
    pub fn new(store: Arc<dyn ConfigStore>, supervisor: Supervisor, engine: TriggerEngine) -> Self {
        Self {
            store,
            supervisor,
            engine,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn engine(&self) -> &TriggerEngine {
        &self.engine
    }

    /// 从存储装载全部配置，启动事件路由并连接已启用的 PLC。
    ///
    /// 单条配置无效只记录，不阻止启动。
    pub async fn bootstrap(&self) -> Result<BootReport, GatewayError> {
        let mut report = BootReport::default();
        for plc in self.store.list_plcs()? {
            let name = plc.name.clone();
            match self.supervisor.add_plc(plc) {
                Ok(()) => report.plcs += 1,
                Err(err) => {
                    warn!(target: "plcgw.app", plc = %name, error = %err, "plc_rejected");
                    report.rejected.push(format!("plc {}: {}", name, err));
                }
            }
        }
        for pack in self.store.list_packs()? {
            let name = pack.name.clone();
            if let Err(err) = self.engine.set_pack(pack) {
                warn!(target: "plcgw.app", pack = %name, error = %err, "pack_rejected");
                report.rejected.push(format!("pack {}: {}", name, err));
            }
        }
        for trigger in self.store.list_triggers()? {
            let name = trigger.name.clone();
            match self.engine.add_trigger(trigger) {
                Ok(()) => report.triggers += 1,
                Err(err) => {
                    warn!(target: "plcgw.app", trigger = %name, error = %err, "trigger_rejected");
                    report.rejected.push(format!("trigger {}: {}", name, err));
                }
            }
        }
        self.engine.start();
        report.connected = self.supervisor.connect_enabled().await;
        info!(
            target: "plcgw.app",
            plcs = report.plcs,
            triggers = report.triggers,
            connected = report.connected,
            rejected = report.rejected.len(),
            "gateway_started"
        );
        Ok(report)
    }

    pub async fn add_plc(&self, config: PlcConfig) -> Result<(), GatewayError> {
        let name = config.name.clone();
        let enabled = config.enabled;
        self.supervisor.add_plc(config.clone())?;
        if let Err(err) = self.store.add_plc(config) {
            let _ = self.supervisor.remove_plc(&name).await;
            return Err(err.into());
        }
        if enabled {
            self.connect_quietly(&name).await;
        }
        Ok(())
    }

    pub async fn update_plc(&self, name: &str, config: PlcConfig) -> Result<(), GatewayError> {
        let previous = self.supervisor.get_plc(name)?.config;
        let renamed = config.name.clone();
        self.supervisor.update_plc(name, config.clone()).await?;
        if let Err(err) = self.store.update_plc(name, config) {
            if let Err(restore) = self.supervisor.update_plc(&renamed, previous).await {
                warn!(target: "plcgw.app", plc = %name, error = %restore, "plc_restore_failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// 删除 PLC；引用它的触发器进入 Error，直到同名 PLC 重新出现。
    pub async fn remove_plc(&self, name: &str) -> Result<(), GatewayError> {
        let persisted = self.store.remove_plc(name)?;
        match self.supervisor.remove_plc(name).await {
            Ok(()) => Ok(()),
            Err(SupervisorError::UnknownPlc(_)) if persisted => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn connect(&self, name: &str) -> Result<(), GatewayError> {
        Ok(self.supervisor.connect(name).await?)
    }

    pub async fn disconnect(&self, name: &str) -> Result<(), GatewayError> {
        Ok(self.supervisor.disconnect(name).await?)
    }

    pub async fn add_trigger(&self, config: TriggerConfig) -> Result<(), GatewayError> {
        let name = config.name.clone();
        self.engine.add_trigger(config.clone())?;
        if let Err(err) = self.store.add_trigger(config) {
            let _ = self.engine.remove_trigger(&name).await;
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn update_trigger(&self, name: &str, config: TriggerConfig) -> Result<(), GatewayError> {
        let previous = self.engine.get_trigger(name)?;
        let renamed = config.name.clone();
        self.engine.update_trigger(name, config.clone()).await?;
        if let Err(err) = self.store.update_trigger(name, config) {
            if let Err(restore) = self.engine.update_trigger(&renamed, previous).await {
                warn!(target: "plcgw.app", trigger = %name, error = %restore, "trigger_restore_failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn remove_trigger(&self, name: &str) -> Result<(), GatewayError> {
        let persisted = self.store.remove_trigger(name)?;
        match self.engine.remove_trigger(name).await {
            Ok(()) => Ok(()),
            Err(TriggerError::UnknownTrigger(_)) if persisted => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// 启停触发器并持久化 enabled 标志。
    pub async fn set_trigger_enabled(&self, name: &str, enabled: bool) -> Result<(), GatewayError> {
        if enabled {
            self.engine.start_trigger(name).await?;
        } else {
            self.engine.stop_trigger(name).await?;
        }
        let config = self.engine.get_trigger(name)?;
        self.store.update_trigger(name, config)?;
        Ok(())
    }

    pub async fn test_fire(&self, name: &str) -> Result<FireReport, GatewayError> {
        Ok(self.engine.test_fire_trigger(name).await?)
    }

    pub fn set_pack(&self, pack: TagPack) -> Result<(), GatewayError> {
        self.engine.set_pack(pack.clone())?;
        self.store.upsert_pack(pack)?;
        Ok(())
    }

    pub fn remove_pack(&self, name: &str) -> Result<(), GatewayError> {
        self.engine.remove_pack(name)?;
        self.store.remove_pack(name)?;
        Ok(())
    }

    /// 输出一行运行状态汇总。
    pub fn log_status(&self) {
        let plcs = self.supervisor.list_plcs();
        let connected = plcs
            .iter()
            .filter(|plc| plc.status == ConnectionStatus::Connected)
            .count();
        let faulted = plcs
            .iter()
            .filter(|plc| plc.status == ConnectionStatus::Error)
            .count();
        let statuses = self.engine.list_statuses();
        let triggers_in_error = statuses
            .iter()
            .filter(|status| status.status == TriggerStatus::Error)
            .count();
        let stats = self.supervisor.poll_stats();
        let metrics = self.supervisor.metrics().snapshot();
        info!(
            target: "plcgw.app",
            plcs = plcs.len(),
            connected,
            faulted,
            triggers = statuses.len(),
            triggers_in_error,
            poll_cycles = stats.poll_cycles,
            changes_found = stats.changes_found,
            fires = metrics.trigger_fires,
            dispatch_failures = metrics.dispatch_failure,
            "gateway_status"
        );
    }

    /// 停止触发引擎后断开全部 PLC。
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        self.supervisor.shutdown().await;
        info!(target: "plcgw.app", "gateway_stopped");
    }

    async fn connect_quietly(&self, name: &str) {
        if let Err(err) = self.supervisor.connect(name).await {
            warn!(target: "plcgw.app", plc = %name, error = %err, "connect_failed");
        }
    }
}
