//! 网关运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PLC / 触发器配置文件（JSON）；为空时以空配置启动
    pub config_path: Option<String>,
    /// 为 true 时所有协议族都使用内存模拟驱动
    pub simulate: bool,
    /// 连续轮询失败多少次后降级为 Error
    pub failure_threshold: u32,
    pub reconnect_enabled: bool,
    pub reconnect_interval_ms: u64,
    pub reconnect_max_interval_ms: u64,
    /// 单个下游发布超时
    pub dispatch_timeout_ms: u64,
    /// PLC 事件广播通道容量
    pub event_capacity: usize,
    /// 内存事件日志保留条数
    pub log_buffer: usize,
    /// 周期性状态日志间隔；0 表示关闭
    pub status_interval_secs: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_path = read_optional("PLCGW_CONFIG_PATH");
        let simulate = read_bool_with_default("PLCGW_SIMULATE", false);
        let failure_threshold = read_u32_with_default("PLCGW_FAILURE_THRESHOLD", 3)?;
        if failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "PLCGW_FAILURE_THRESHOLD".to_string(),
                "0".to_string(),
            ));
        }
        let reconnect_enabled = read_bool_with_default("PLCGW_RECONNECT_ENABLED", true);
        let reconnect_interval_ms = read_u64_with_default("PLCGW_RECONNECT_INTERVAL_MS", 5000)?;
        let reconnect_max_interval_ms =
            read_u64_with_default("PLCGW_RECONNECT_MAX_INTERVAL_MS", 60_000)?
                .max(reconnect_interval_ms);
        let dispatch_timeout_ms = read_u64_with_default("PLCGW_DISPATCH_TIMEOUT_MS", 5000)?;
        let event_capacity = read_u64_with_default("PLCGW_EVENT_CAPACITY", 1024)?.max(1) as usize;
        let log_buffer = read_u64_with_default("PLCGW_LOG_BUFFER", 1000)? as usize;
        let status_interval_secs = read_u64_with_default("PLCGW_STATUS_INTERVAL_SECS", 60)?;

        Ok(Self {
            config_path,
            simulate,
            failure_threshold,
            reconnect_enabled,
            reconnect_interval_ms,
            reconnect_max_interval_ms,
            dispatch_timeout_ms,
            event_capacity,
            log_buffer,
            status_interval_secs,
        })
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn reconnect_max_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn status_interval(&self) -> Option<Duration> {
        if self.status_interval_secs == 0 {
            return None;
        }
        Some(Duration::from_secs(self.status_interval_secs))
    }
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
