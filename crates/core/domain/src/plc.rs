//! PLC 配置与运行时视图。

use crate::data::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 默认轮询周期（毫秒）
pub const DEFAULT_POLL_RATE_MS: u64 = 1000;
/// 轮询周期下限（毫秒）
pub const MIN_POLL_RATE_MS: u64 = 250;
/// 轮询周期上限（毫秒）
pub const MAX_POLL_RATE_MS: u64 = 10_000;
/// 默认 I/O 超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// PLC 协议族及其专属参数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum PlcFamily {
    /// Allen-Bradley ControlLogix / CompactLogix（EtherNet/IP + CIP）
    Logix {
        #[serde(default)]
        slot: u8,
    },
    /// Siemens S7（S7comm）
    S7 {
        #[serde(default)]
        rack: u8,
        #[serde(default = "default_s7_slot")]
        slot: u8,
    },
    /// Beckhoff TwinCAT（ADS/AMS）
    Beckhoff {
        ams_net_id: String,
        #[serde(default = "default_ams_port")]
        ams_port: u16,
    },
    /// Omron（FINS）
    Omron {
        #[serde(default)]
        network: u8,
        node: u8,
        #[serde(default)]
        unit: u8,
    },
}

fn default_s7_slot() -> u8 {
    1
}

fn default_ams_port() -> u16 {
    851
}

/// 协议族类别（驱动注册表的键）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    Logix,
    S7,
    Beckhoff,
    Omron,
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FamilyKind::Logix => "logix",
            FamilyKind::S7 => "s7",
            FamilyKind::Beckhoff => "beckhoff",
            FamilyKind::Omron => "omron",
        };
        f.write_str(name)
    }
}

impl PlcFamily {
    pub fn kind(&self) -> FamilyKind {
        match self {
            PlcFamily::Logix { .. } => FamilyKind::Logix,
            PlcFamily::S7 { .. } => FamilyKind::S7,
            PlcFamily::Beckhoff { .. } => FamilyKind::Beckhoff,
            PlcFamily::Omron { .. } => FamilyKind::Omron,
        }
    }

    /// 是否支持标签浏览（Logix 符号表、ADS 符号表）；其余协议族由用户声明地址。
    pub fn discovers_tags(&self) -> bool {
        matches!(self, PlcFamily::Logix { .. } | PlcFamily::Beckhoff { .. })
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            PlcFamily::Logix { slot } if *slot > 31 => {
                Err(format!("logix slot out of range: {}", slot))
            }
            PlcFamily::S7 { rack, .. } if *rack > 7 => Err(format!("s7 rack out of range: {}", rack)),
            PlcFamily::S7 { slot, .. } if *slot > 31 => Err(format!("s7 slot out of range: {}", slot)),
            PlcFamily::Beckhoff { ams_net_id, .. } => {
                let octets: Vec<&str> = ams_net_id.split('.').collect();
                if octets.len() != 6 || octets.iter().any(|octet| octet.parse::<u8>().is_err()) {
                    return Err(format!("invalid ams net id: {}", ams_net_id));
                }
                Ok(())
            }
            PlcFamily::Omron { network, .. } if *network > 127 => {
                Err(format!("fins network out of range: {}", network))
            }
            _ => Ok(()),
        }
    }
}

/// 标签选择（用户在配置中勾选或声明的标签）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSelection {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub alias: Option<String>,
    /// 声明类型（如 DINT、REAL、DB1.DBW0 对应的 INT）
    #[serde(default)]
    pub data_type: Option<String>,
}

impl TagSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            writable: false,
            alias: None,
            data_type: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// PLC 配置（不可变快照，整体替换）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlcConfig {
    pub name: String,
    pub address: String,
    #[serde(flatten)]
    pub family: PlcFamily,
    #[serde(default)]
    pub poll_rate_ms: Option<u64>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<TagSelection>,
}

impl PlcConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>, family: PlcFamily) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            family,
            poll_rate_ms: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            enabled: true,
            tags: Vec::new(),
        }
    }

    /// 实际轮询周期：默认 1000ms，限制在 [250, 10000]。
    pub fn poll_rate(&self) -> Duration {
        let rate = self
            .poll_rate_ms
            .unwrap_or(DEFAULT_POLL_RATE_MS)
            .clamp(MIN_POLL_RATE_MS, MAX_POLL_RATE_MS);
        Duration::from_millis(rate)
    }

    /// 单次驱动调用超时。
    pub fn timeout(&self) -> Duration {
        if self.timeout_ms == 0 {
            return Duration::from_millis(DEFAULT_TIMEOUT_MS);
        }
        Duration::from_millis(self.timeout_ms)
    }

    /// 需要轮询的标签（已启用的选择）。
    pub fn polled_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter(|tag| tag.enabled)
            .map(|tag| tag.name.clone())
            .collect()
    }

    pub fn selection(&self, tag: &str) -> Option<&TagSelection> {
        self.tags.iter().find(|selection| selection.name == tag)
    }

    /// 校验配置字段。
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("plc name is empty".to_string());
        }
        if self.address.trim().is_empty() {
            return Err(format!("plc {} has empty address", self.name));
        }
        self.family.validate()?;
        let mut seen = std::collections::HashSet::new();
        for tag in &self.tags {
            if tag.name.trim().is_empty() {
                return Err(format!("plc {} has a tag with empty name", self.name));
            }
            if !seen.insert(tag.name.as_str()) {
                return Err(format!("plc {} declares tag {} twice", self.name, tag.name));
            }
        }
        Ok(())
    }
}

/// PLC 连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// 轮询统计。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub tags_polled: u64,
    pub changes_found: u64,
    pub poll_cycles: u64,
    pub consecutive_failures: u32,
    pub last_poll_ms: Option<i64>,
    pub last_error: Option<String>,
}

impl PollStats {
    /// 合并另一台 PLC 的统计（用于全局汇总）。
    pub fn merge(&mut self, other: &PollStats) {
        self.tags_polled += other.tags_polled;
        self.changes_found += other.changes_found;
        self.poll_cycles += other.poll_cycles;
        self.consecutive_failures = self.consecutive_failures.max(other.consecutive_failures);
        let newer = other.last_poll_ms > self.last_poll_ms;
        if newer {
            self.last_poll_ms = other.last_poll_ms;
        }
        if other.last_error.is_some() && (newer || self.last_error.is_none()) {
            self.last_error = other.last_error.clone();
        }
    }
}

/// PLC 运行时只读视图。
#[derive(Debug, Clone, Serialize)]
pub struct PlcView {
    pub config: PlcConfig,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub identity: Option<DeviceIdentity>,
    pub stats: PollStats,
    pub tag_count: usize,
}

/// 监管器广播的 PLC 事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlcEvent {
    pub plc: String,
    pub kind: PlcEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlcEventKind {
    Added,
    Removed,
    StatusChanged(ConnectionStatus),
    /// 一次轮询已完整写入缓存
    Refreshed { generation: u64 },
}
