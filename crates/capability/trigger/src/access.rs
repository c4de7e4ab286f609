use async_trait::async_trait;
use domain::{ConnectionStatus, PlcEvent, TagData, TagValue};
use plcgw_supervisor::{Supervisor, SupervisorError};
use tokio::sync::broadcast;

/// 触发引擎对 PLC 侧的访问接口。
#[async_trait]
pub trait PlcAccess: Send + Sync {
    fn contains(&self, plc: &str) -> bool;

    /// 未注册时返回 None。
    fn status(&self, plc: &str) -> Option<ConnectionStatus>;

    /// 缓存中的标签值（拷贝）。
    fn value(&self, plc: &str, tag: &str) -> Option<TagValue>;

    async fn write_tag(&self, plc: &str, tag: &str, value: TagData) -> Result<(), SupervisorError>;

    fn subscribe(&self) -> broadcast::Receiver<PlcEvent>;
}

#[async_trait]
impl PlcAccess for Supervisor {
    fn contains(&self, plc: &str) -> bool {
        Supervisor::contains(self, plc)
    }

    fn status(&self, plc: &str) -> Option<ConnectionStatus> {
        self.get_status(plc).ok()
    }

    fn value(&self, plc: &str, tag: &str) -> Option<TagValue> {
        self.get_value(plc, tag).ok().flatten()
    }

    async fn write_tag(&self, plc: &str, tag: &str, value: TagData) -> Result<(), SupervisorError> {
        Supervisor::write_tag(self, plc, tag, value).await
    }

    fn subscribe(&self) -> broadcast::Receiver<PlcEvent> {
        Supervisor::subscribe(self)
    }
}
