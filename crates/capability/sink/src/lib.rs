//! 触发事件发布下游。
//!
//! 触发引擎只依赖 `PublishSink`；`SinkHub` 按 (类别, 名称) 路由到具体 `Destination`。

mod mqtt;

pub use mqtt::{MqttDestination, MqttDestinationConfig, qos_from_u8};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::info;

/// 下游类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationClass {
    Mqtt,
    Kafka,
}

impl fmt::Display for DestinationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationClass::Mqtt => f.write_str("mqtt"),
            DestinationClass::Kafka => f.write_str("kafka"),
        }
    }
}

/// 一次触发产生的事件消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub trigger: String,
    /// MQTT topic 后缀 / Kafka 消息键
    pub key: String,
    pub payload: Vec<u8>,
}

/// 发布错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("destination unavailable: {0}")]
    Unavailable(String),
    #[error("publish timeout: {0}")]
    Timeout(String),
    #[error("invalid destination config: {0}")]
    InvalidConfig(String),
}

/// 单个下游。
#[async_trait]
pub trait Destination: Send + Sync {
    async fn send(&self, message: &EventMessage) -> Result<(), SinkError>;
}

/// 发布下游契约。
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(
        &self,
        class: DestinationClass,
        name: &str,
        message: &EventMessage,
    ) -> Result<(), SinkError>;

    /// 已配置的下游名称（按名称排序）。
    fn destinations(&self, class: DestinationClass) -> Vec<String>;
}

/// 空下游（用于占位）。
#[derive(Debug, Default)]
pub struct NoopDestination;

#[async_trait]
impl Destination for NoopDestination {
    async fn send(&self, _message: &EventMessage) -> Result<(), SinkError> {
        Ok(())
    }
}

/// 已配置但没有可用传输链路的下游，每次发布都返回 `Unavailable`。
#[derive(Debug)]
pub struct DetachedDestination {
    reason: String,
}

impl DetachedDestination {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Destination for DetachedDestination {
    async fn send(&self, _message: &EventMessage) -> Result<(), SinkError> {
        Err(SinkError::Unavailable(self.reason.clone()))
    }
}

type Routes = HashMap<(DestinationClass, String), Arc<dyn Destination>>;

/// 按名称路由的下游集合。
#[derive(Clone, Default)]
pub struct SinkHub {
    routes: Arc<RwLock<Routes>>,
}

impl SinkHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        class: DestinationClass,
        name: impl Into<String>,
        destination: Arc<dyn Destination>,
    ) {
        let name = name.into();
        info!(target: "plcgw.sink", class = %class, destination = %name, "destination_registered");
        self.routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((class, name), destination);
    }

    pub fn unregister(&self, class: DestinationClass, name: &str) -> bool {
        self.routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&(class, name.to_string()))
            .is_some()
    }

    fn route(&self, class: DestinationClass, name: &str) -> Option<Arc<dyn Destination>> {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(class, name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl PublishSink for SinkHub {
    async fn publish(
        &self,
        class: DestinationClass,
        name: &str,
        message: &EventMessage,
    ) -> Result<(), SinkError> {
        let destination = self
            .route(class, name)
            .ok_or_else(|| SinkError::UnknownDestination(format!("{} {}", class, name)))?;
        destination.send(message).await
    }

    fn destinations(&self, class: DestinationClass) -> Vec<String> {
        let routes = self
            .routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = routes
            .keys()
            .filter(|(route_class, _)| *route_class == class)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}
