//! 配置文档模型

use domain::{PlcConfig, TagPack, TriggerConfig};
use serde::{Deserialize, Serialize};

/// 配置文件整体结构。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub plcs: Vec<PlcConfig>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub packs: Vec<TagPack>,
    #[serde(default)]
    pub brokers: Vec<MqttBrokerConfig>,
    #[serde(default)]
    pub clusters: Vec<KafkaClusterConfig>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic_prefix() -> String {
    "plcgw/events".to_string()
}

fn default_qos() -> u8 {
    1
}

/// MQTT broker 下游配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttBrokerConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
}

/// Kafka 集群下游配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaClusterConfig {
    pub name: String,
    pub brokers: Vec<String>,
    pub topic: String,
}
