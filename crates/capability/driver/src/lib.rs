//! # PLC 驱动能力模块
//!
//! 定义每个协议族驱动需要实现的契约，监管器只通过该契约访问设备：
//!
//! ```text
//! PlcConfig.family ──► DriverRegistry ──► DriverFactory ──► Arc<dyn Driver>
//!                                                             │
//!                          Poller: read_tags ◄────────────────┤
//!                          Trigger ack: write_tag ◄───────────┘
//! ```
//!
//! 协议编解码（CIP、S7comm、ADS、FINS）由各协议族驱动自行实现；
//! 本 crate 提供 `sim` 内存驱动用于测试与演示。

mod error;
mod registry;
pub mod sim;

pub use error::DriverError;
pub use registry::{DriverFactory, DriverRegistry};

use async_trait::async_trait;
use domain::{DeviceIdentity, StructureTemplate, TagData, TagInfo, TagValue};
use std::collections::HashMap;
use std::time::Duration;

/// 单台 PLC 的协议客户端。
///
/// 每个会话使用一个新实例；方法以 `&self` 调用，轮询与写回可并发进入。
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, address: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn disconnect(&self) -> Result<(), DriverError>;

    /// 浏览设备符号表；不支持浏览的协议族返回空列表。
    async fn discover_tags(&self) -> Result<Vec<TagInfo>, DriverError> {
        Ok(Vec::new())
    }

    /// 批量读取。整批失败返回 Err；单个标签失败写入对应 `TagValue.error`。
    async fn read_tags(&self, names: &[String]) -> Result<HashMap<String, TagValue>, DriverError>;

    async fn write_tag(&self, name: &str, value: &TagData) -> Result<(), DriverError>;

    async fn device_info(&self) -> Result<Option<DeviceIdentity>, DriverError>;

    /// 按类型码查询 UDT 结构模板。
    async fn template(&self, type_code: u16) -> Result<StructureTemplate, DriverError> {
        Err(DriverError::Unsupported(format!(
            "structure template {} not available",
            type_code
        )))
    }
}
