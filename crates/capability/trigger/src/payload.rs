//! 触发事件负载（camelCase JSON）。

use domain::TagData;
use serde::Serialize;

/// 负载中的一条附带数据。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataEntry {
    pub key: String,
    pub plc: String,
    pub tag: String,
    pub value: Option<TagData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventPayload<'a> {
    pub event_id: &'a str,
    pub trigger: &'a str,
    pub plc: &'a str,
    pub tag: &'a str,
    pub value: Option<&'a TagData>,
    pub timestamp_ms: i64,
    pub sequence: u64,
    pub test: bool,
    pub selector: &'a str,
    pub data: &'a [DataEntry],
}

/// 附带数据的键：别名优先；同 PLC 标签用标签名，跨 PLC 用 `plc.tag`。
pub(crate) fn data_key(alias: Option<&str>, plc: &str, tag: &str, trigger_plc: &str) -> String {
    match alias.map(str::trim).filter(|alias| !alias.is_empty()) {
        Some(alias) => alias.to_string(),
        None if plc == trigger_plc => tag.to_string(),
        None => format!("{}.{}", plc, tag),
    }
}
