use crate::{Destination, EventMessage, SinkError};
use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{info, warn};

/// MQTT 下游配置。
#[derive(Debug, Clone)]
pub struct MqttDestinationConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
}

/// MQTT 下游：事件发布到 `{topic_prefix}/{key}`。
#[derive(Clone)]
pub struct MqttDestination {
    name: String,
    client: AsyncClient,
    topic_prefix: String,
    qos: QoS,
}

impl MqttDestination {
    /// 校验配置后建立客户端并启动事件循环任务。
    pub fn connect(
        config: MqttDestinationConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), SinkError> {
        validate(&config)?;
        let client_id = format!("plcgw-{}-{}", config.name, uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let broker = config.name.clone();
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "plcgw.sink", broker = %broker, "mqtt eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        Ok((
            Self {
                name: config.name,
                client,
                topic_prefix: config.topic_prefix,
                qos: qos_from_u8(config.qos),
            },
            handle,
        ))
    }

    pub fn topic_for(&self, key: &str) -> String {
        topic_for(&self.topic_prefix, key)
    }
}

fn validate(config: &MqttDestinationConfig) -> Result<(), SinkError> {
    let invalid = |reason: String| -> Result<(), SinkError> { Err(SinkError::InvalidConfig(reason)) };
    if config.name.trim().is_empty() {
        return invalid("broker name is empty".to_string());
    }
    if config.host.trim().is_empty() {
        return invalid(format!("broker {} has no host", config.name));
    }
    if config.port == 0 {
        return invalid(format!("broker {} has port 0", config.name));
    }
    if config.qos > 2 {
        return invalid(format!("broker {} has qos {}", config.name, config.qos));
    }
    if config.username.is_some() != config.password.is_some() {
        return invalid(format!(
            "broker {} needs both username and password",
            config.name
        ));
    }
    Ok(())
}

fn topic_for(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let key = key.trim_matches('/');
    if prefix.is_empty() {
        return key.to_string();
    }
    format!("{}/{}", prefix, key)
}

#[async_trait]
impl Destination for MqttDestination {
    async fn send(&self, message: &EventMessage) -> Result<(), SinkError> {
        let topic = self.topic_for(&message.key);
        info!(
            target: "plcgw.sink",
            broker = %self.name,
            trigger = %message.trigger,
            topic = %topic,
            payload_size = message.payload.len(),
            "event_publish"
        );
        self.client
            .publish(topic, self.qos, false, message.payload.clone())
            .await
            .map_err(|err| SinkError::Publish(err.to_string()))
    }
}

pub fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_joins_prefix_and_key() {
        assert_eq!(topic_for("plcgw/events/", "line1/t1"), "plcgw/events/line1/t1");
        assert_eq!(topic_for("", "/t1"), "t1");
    }

    fn broker() -> MqttDestinationConfig {
        MqttDestinationConfig {
            name: "plant".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic_prefix: "plcgw/events".to_string(),
            qos: 1,
        }
    }

    #[test]
    fn connect_rejects_invalid_options() {
        assert!(validate(&broker()).is_ok());

        let cases = [
            MqttDestinationConfig {
                host: " ".to_string(),
                ..broker()
            },
            MqttDestinationConfig {
                port: 0,
                ..broker()
            },
            MqttDestinationConfig {
                qos: 3,
                ..broker()
            },
            MqttDestinationConfig {
                username: Some("gw".to_string()),
                ..broker()
            },
        ];
        for config in cases {
            assert!(matches!(
                MqttDestination::connect(config),
                Err(SinkError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn qos_defaults_to_at_least_once() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
        assert_eq!(qos_from_u8(9), QoS::AtLeastOnce);
    }
}
