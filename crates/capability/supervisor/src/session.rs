use crate::SupervisorError;
use domain::{StructureTemplate, TagData, TagValue};
use plcgw_driver::Driver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;

/// 一次连接会话：驱动实例 + I/O 闸门。
///
/// 所有驱动调用持有闸门读锁；关闭时取写锁，等待进行中的调用结束后再断开驱动。
pub(crate) struct Session {
    driver: Arc<dyn Driver>,
    open: RwLock<bool>,
}

impl Session {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            open: RwLock::new(true),
        }
    }

    pub async fn read(
        &self,
        names: &[String],
        limit: Duration,
    ) -> Result<HashMap<String, TagValue>, SupervisorError> {
        let open = self.open.read().await;
        if !*open {
            return Err(SupervisorError::NotConnected("session closed".to_string()));
        }
        match timeout(limit, self.driver.read_tags(names)).await {
            Ok(result) => result.map_err(SupervisorError::from),
            Err(_) => Err(SupervisorError::Timeout(format!(
                "read of {} tags exceeded {} ms",
                names.len(),
                limit.as_millis()
            ))),
        }
    }

    pub async fn write(
        &self,
        tag: &str,
        value: &TagData,
        limit: Duration,
    ) -> Result<(), SupervisorError> {
        let open = self.open.read().await;
        if !*open {
            return Err(SupervisorError::NotConnected("session closed".to_string()));
        }
        match timeout(limit, self.driver.write_tag(tag, value)).await {
            Ok(result) => result.map_err(SupervisorError::from),
            Err(_) => Err(SupervisorError::Timeout(format!(
                "write of {} exceeded {} ms",
                tag,
                limit.as_millis()
            ))),
        }
    }

    pub async fn template(
        &self,
        type_code: u16,
        limit: Duration,
    ) -> Result<StructureTemplate, SupervisorError> {
        let open = self.open.read().await;
        if !*open {
            return Err(SupervisorError::NotConnected("session closed".to_string()));
        }
        match timeout(limit, self.driver.template(type_code)).await {
            Ok(result) => result.map_err(SupervisorError::from),
            Err(_) => Err(SupervisorError::Timeout(format!(
                "template {} lookup exceeded {} ms",
                type_code,
                limit.as_millis()
            ))),
        }
    }

    /// 关闭闸门并断开驱动（尽力而为）。
    pub async fn close(&self, limit: Duration) {
        let mut open = self.open.write().await;
        if !*open {
            return;
        }
        *open = false;
        let _ = timeout(limit, self.driver.disconnect()).await;
    }
}
