//! 触发器配置与运行时视图。

use crate::data::TagData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 条件运算符。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Changed,
    Rising,
    Falling,
}

impl Operator {
    /// 与上一次观测值比较的运算符（每次为真都视为一个边沿）。
    pub fn is_edge(self) -> bool {
        matches!(self, Operator::Changed | Operator::Rising | Operator::Falling)
    }

    pub fn needs_value(self) -> bool {
        !self.is_edge()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Changed => "changed",
            Operator::Rising => "rising",
            Operator::Falling => "falling",
        };
        f.write_str(name)
    }
}

/// 比较值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompareValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<CompareValue> for TagData {
    fn from(value: CompareValue) -> Self {
        match value {
            CompareValue::Bool(v) => TagData::Bool(v),
            CompareValue::Int(v) => TagData::Int(v),
            CompareValue::Float(v) => TagData::Float(v),
            CompareValue::String(v) => TagData::String(v),
        }
    }
}

/// 触发条件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: Operator,
    #[serde(default)]
    pub value: Option<CompareValue>,
}

impl Condition {
    pub fn new(operator: Operator, value: Option<CompareValue>) -> Self {
        Self { operator, value }
    }
}

/// 下游选择器："all" | "none" | 指定名称。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SinkSelector {
    #[default]
    All,
    None,
    Named(String),
}

impl From<String> for SinkSelector {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            SinkSelector::All
        } else if trimmed.eq_ignore_ascii_case("none") {
            SinkSelector::None
        } else {
            SinkSelector::Named(trimmed.to_string())
        }
    }
}

impl From<SinkSelector> for String {
    fn from(value: SinkSelector) -> Self {
        match value {
            SinkSelector::All => "all".to_string(),
            SinkSelector::None => "none".to_string(),
            SinkSelector::Named(name) => name,
        }
    }
}

/// 事件负载中的数据来源。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// 单个标签；`plc` 为空时取触发器所属 PLC
    Tag {
        #[serde(default)]
        plc: Option<String>,
        tag: String,
        #[serde(default)]
        alias: Option<String>,
    },
    /// 标签包
    Pack { pack: String },
}

/// 标签包成员。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackMember {
    pub plc: String,
    pub tag: String,
    #[serde(default)]
    pub alias: Option<String>,
}

/// 标签包：一组有序的跨 PLC 标签。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPack {
    pub name: String,
    pub members: Vec<PackMember>,
}

fn default_true() -> bool {
    true
}

/// 触发器配置（不可变快照，整体替换）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub plc: String,
    pub tag: String,
    pub condition: Condition,
    #[serde(default)]
    pub ack_tag: Option<String>,
    /// 回执写失败是否使触发器进入 Error
    #[serde(default)]
    pub ack_failure_fatal: bool,
    #[serde(default)]
    pub debounce_ms: u64,
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub data: Vec<DataSource>,
    #[serde(default)]
    pub mqtt: SinkSelector,
    #[serde(default)]
    pub kafka: SinkSelector,
    /// 自由文本选择器：作为 MQTT topic 后缀 / Kafka 消息键，空则使用触发器名
    #[serde(default)]
    pub selector: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TriggerConfig {
    pub fn new(
        name: impl Into<String>,
        plc: impl Into<String>,
        tag: impl Into<String>,
        condition: Condition,
    ) -> Self {
        Self {
            name: name.into(),
            plc: plc.into(),
            tag: tag.into(),
            condition,
            ack_tag: None,
            ack_failure_fatal: false,
            debounce_ms: 0,
            cooldown_ms: 0,
            data: Vec::new(),
            mqtt: SinkSelector::All,
            kafka: SinkSelector::All,
            selector: String::new(),
            enabled: true,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// 实际冷却时间：不小于去抖窗口。
    pub fn effective_cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.max(self.debounce_ms))
    }

    /// 发布键。
    pub fn publish_key(&self) -> &str {
        let selector = self.selector.trim();
        if selector.is_empty() {
            &self.name
        } else {
            selector
        }
    }

    /// 触发器引用的全部 PLC（源 PLC + 数据标签所在 PLC，不展开标签包）。
    pub fn referenced_plcs(&self) -> Vec<&str> {
        let mut plcs = vec![self.plc.as_str()];
        for source in &self.data {
            if let DataSource::Tag { plc: Some(plc), .. } = source {
                if !plcs.contains(&plc.as_str()) {
                    plcs.push(plc.as_str());
                }
            }
        }
        plcs
    }

    /// 是否与另一配置绑定同一数据源（PLC + 触发标签）。
    pub fn same_source(&self, other: &TriggerConfig) -> bool {
        self.plc == other.plc && self.tag == other.tag
    }

    /// 校验配置字段（不含跨实体引用检查）。
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("trigger name is empty".to_string());
        }
        if self.plc.trim().is_empty() {
            return Err(format!("trigger {} has no plc", self.name));
        }
        if self.tag.trim().is_empty() {
            return Err(format!("trigger {} has no tag", self.name));
        }
        if self.condition.operator.needs_value() && self.condition.value.is_none() {
            return Err(format!(
                "trigger {} operator {} requires a comparison value",
                self.name, self.condition.operator
            ));
        }
        if let Some(ack_tag) = &self.ack_tag {
            if ack_tag.trim().is_empty() {
                return Err(format!("trigger {} has empty ack tag", self.name));
            }
        }
        for source in &self.data {
            match source {
                DataSource::Tag { tag, .. } if tag.trim().is_empty() => {
                    return Err(format!("trigger {} has a data tag with empty name", self.name));
                }
                DataSource::Pack { pack } if pack.trim().is_empty() => {
                    return Err(format!("trigger {} has a pack with empty name", self.name));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// 触发器状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Armed,
    Firing,
    Cooldown,
    Error,
    /// 已停止，不参与评估
    Disabled,
}

impl TriggerStatus {
    /// 合法迁移：Armed→Firing→Cooldown→Armed、*→Error→Armed、*→Disabled→Armed。
    pub fn can_transition_to(self, next: TriggerStatus) -> bool {
        use TriggerStatus::*;
        matches!(
            (self, next),
            (Armed, Firing)
                | (Firing, Cooldown)
                | (Cooldown, Armed)
                | (Error, Armed)
                | (Disabled, Armed)
                | (_, Error)
                | (_, Disabled)
        )
    }
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerStatus::Armed => "armed",
            TriggerStatus::Firing => "firing",
            TriggerStatus::Cooldown => "cooldown",
            TriggerStatus::Error => "error",
            TriggerStatus::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// 触发器运行时只读视图。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerStatusView {
    pub name: String,
    pub status: TriggerStatus,
    pub last_error: Option<String>,
    pub fire_count: u64,
    pub last_fire_ms: Option<i64>,
    pub last_value: Option<TagData>,
}
