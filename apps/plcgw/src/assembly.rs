//! 运行时装配
//!
//! 根据运行配置构建驱动注册表、监管器设置和发布下游集合。

use crate::gateway::GatewayError;
use plcgw_config::AppConfig;
use plcgw_driver::DriverRegistry;
use plcgw_driver::sim::SimFactory;
use plcgw_sink::{
    DestinationClass, DetachedDestination, MqttDestination, MqttDestinationConfig, SinkHub,
};
use plcgw_store::ConfigStore;
use plcgw_supervisor::{ReconnectPolicy, SupervisorSettings};
use plcgw_trigger::EngineSettings;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 驱动注册表：模拟模式下所有协议族共用内存驱动。
pub fn driver_registry(simulate: bool) -> DriverRegistry {
    if simulate {
        info!(target: "plcgw.app", "simulated_drivers_enabled");
        return DriverRegistry::new().with_all(Arc::new(SimFactory::new()));
    }
    // 协议编解码器由独立 crate 提供，此处不内置
    warn!(target: "plcgw.app", "no protocol drivers linked, set PLCGW_SIMULATE=true to run with simulated PLCs");
    DriverRegistry::new()
}

pub fn supervisor_settings(config: &AppConfig) -> SupervisorSettings {
    SupervisorSettings {
        failure_threshold: config.failure_threshold,
        reconnect: ReconnectPolicy {
            enabled: config.reconnect_enabled,
            initial_delay: config.reconnect_interval(),
            max_delay: config.reconnect_max_interval(),
        },
        event_capacity: config.event_capacity,
    }
}

pub fn engine_settings(config: &AppConfig) -> EngineSettings {
    EngineSettings {
        dispatch_timeout: config.dispatch_timeout(),
        ..EngineSettings::default()
    }
}

/// 按存储中的 broker / cluster 配置注册下游。
///
/// 返回 MQTT 事件循环任务句柄，退出时中止。
pub fn sink_hub(store: &dyn ConfigStore) -> Result<(SinkHub, Vec<JoinHandle<()>>), GatewayError> {
    let hub = SinkHub::new();
    let mut transports = Vec::new();
    for broker in store.list_brokers()? {
        let (destination, handle) = MqttDestination::connect(MqttDestinationConfig {
            name: broker.name.clone(),
            host: broker.host,
            port: broker.port,
            username: broker.username,
            password: broker.password,
            topic_prefix: broker.topic_prefix,
            qos: broker.qos,
        })?;
        hub.register(DestinationClass::Mqtt, broker.name, Arc::new(destination));
        transports.push(handle);
    }
    for cluster in store.list_clusters()? {
        let reason = format!(
            "kafka transport not linked (cluster {}, topic {})",
            cluster.name, cluster.topic
        );
        hub.register(
            DestinationClass::Kafka,
            cluster.name,
            Arc::new(DetachedDestination::new(reason)),
        );
    }
    Ok((hub, transports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcgw_sink::{PublishSink, SinkError};
    use plcgw_store::InMemoryConfigStore;

    #[test]
    fn clusters_register_as_detached_destinations() {
        let store = InMemoryConfigStore::from_json(
            r#"{"clusters":[{"name":"lake","brokers":["k1:9092"],"topic":"events"}]}"#,
        )
        .expect("store");
        let (hub, transports) = sink_hub(&store).expect("hub");
        assert!(transports.is_empty());
        assert_eq!(hub.destinations(DestinationClass::Kafka), vec!["lake".to_string()]);
        assert!(hub.destinations(DestinationClass::Mqtt).is_empty());
    }

    #[test]
    fn invalid_broker_fails_assembly() {
        let store = InMemoryConfigStore::from_json(
            r#"{"brokers":[{"name":"plant","host":"10.0.0.9","qos":5}]}"#,
        )
        .expect("store");
        assert!(matches!(
            sink_hub(&store),
            Err(GatewayError::Sink(SinkError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn unsimulated_registry_has_no_factories() {
        assert!(!driver_registry(false).supports(domain::FamilyKind::S7));
        assert!(driver_registry(true).supports(domain::FamilyKind::Omron));
    }
}
