//! # 配置存储能力模块
//!
//! 为监管器和触发引擎提供 PLC / 触发器 / 标签包 / 下游配置：
//! - `ConfigStore`：存储接口
//! - `InMemoryConfigStore`：内存实现，可从 JSON 加载并在每次编辑后写回文件

mod error;
mod in_memory;
mod models;
mod traits;

pub use error::StoreError;
pub use in_memory::InMemoryConfigStore;
pub use models::{ConfigDocument, KafkaClusterConfig, MqttBrokerConfig};
pub use traits::ConfigStore;
