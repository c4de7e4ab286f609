use serde::{Deserialize, Serialize};
use std::fmt;

/// 标签解码后的值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagData {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl TagData {
    /// 按解码值比较（NaN 视为相等，避免每个周期都被计为变化）。
    pub fn same_value(&self, other: &TagData) -> bool {
        match (self, other) {
            (TagData::Float(a), TagData::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TagData::Bool(_) => "bool",
            TagData::Int(_) => "int",
            TagData::Float(_) => "float",
            TagData::String(_) => "string",
            TagData::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for TagData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagData::Bool(v) => write!(f, "{}", v),
            TagData::Int(v) => write!(f, "{}", v),
            TagData::Float(v) => write!(f, "{}", v),
            TagData::String(v) => write!(f, "{}", v),
            TagData::Bytes(v) => {
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// 标签缓存条目。
///
/// `error` 存在时，`data` 为上一次成功读取的旧值或为空。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagValue {
    pub data: Option<TagData>,
    pub raw: Vec<u8>,
    pub error: Option<String>,
    pub updated_at_ms: i64,
}

impl TagValue {
    /// 成功读取的值。
    pub fn ok(data: TagData, raw: Vec<u8>, updated_at_ms: i64) -> Self {
        Self {
            data: Some(data),
            raw,
            error: None,
            updated_at_ms,
        }
    }

    /// 读取失败的值（无解码结果）。
    pub fn failed(error: impl Into<String>, updated_at_ms: i64) -> Self {
        Self {
            data: None,
            raw: Vec::new(),
            error: Some(error.into()),
            updated_at_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.data.is_some()
    }

    /// 当前可信值：读取出错时返回 None。
    pub fn current(&self) -> Option<&TagData> {
        if self.error.is_some() {
            return None;
        }
        self.data.as_ref()
    }
}

/// 设备身份信息。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor: String,
    pub model: String,
    pub version: String,
    #[serde(default)]
    pub serial: Option<String>,
}

/// 已发现或已声明的标签。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    pub data_type: Option<String>,
    #[serde(default)]
    pub writable: bool,
}

/// UDT 结构模板成员。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMember {
    pub name: String,
    pub data_type: String,
    pub offset: u32,
}

/// UDT 结构模板（按类型码查询）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureTemplate {
    pub name: String,
    pub type_code: u16,
    pub byte_size: u32,
    pub members: Vec<TemplateMember>,
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
