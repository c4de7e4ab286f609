use crate::{read_lock, write_lock};
use domain::TagValue;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// 单台 PLC 的标签缓存：轮询器单写，多读者拷贝读取。
#[derive(Debug, Default)]
pub(crate) struct TagCache {
    values: RwLock<HashMap<String, TagValue>>,
}

impl TagCache {
    /// 在一次写锁内应用整批读取结果，返回值发生变化的标签数。
    ///
    /// 单标签错误保留旧的解码值并记录错误；应答中缺失的标签记为错误。
    pub fn apply(&self, polled: &[String], mut fresh: HashMap<String, TagValue>, ts_ms: i64) -> u64 {
        let mut values = write_lock(&self.values);
        let mut changes = 0;
        for name in polled {
            let previous = values.get(name);
            let next = match fresh.remove(name) {
                Some(value) if value.error.is_none() && value.data.is_some() => {
                    let changed = match (previous.and_then(|prev| prev.data.as_ref()), &value.data) {
                        (Some(old), Some(new)) => !old.same_value(new),
                        _ => true,
                    };
                    if changed {
                        changes += 1;
                    }
                    value
                }
                Some(value) => {
                    let error = value
                        .error
                        .unwrap_or_else(|| "read returned no value".to_string());
                    stale(previous, error, value.updated_at_ms)
                }
                None => stale(previous, format!("tag {} missing from read response", name), ts_ms),
            };
            values.insert(name.clone(), next);
        }
        changes
    }

    pub fn snapshot(&self) -> HashMap<String, TagValue> {
        read_lock(&self.values).clone()
    }

    pub fn get(&self, tag: &str) -> Option<TagValue> {
        read_lock(&self.values).get(tag).cloned()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.values).len()
    }

    pub fn clear(&self) {
        write_lock(&self.values).clear();
    }

    /// 会话结束时为全部条目标记错误，保留最后一次的解码值。
    pub fn mark_offline(&self, reason: &str, ts_ms: i64) {
        for value in write_lock(&self.values).values_mut() {
            value.error = Some(reason.to_string());
            value.updated_at_ms = ts_ms;
        }
    }

    /// 删除不再声明的标签。
    pub fn retain(&self, keep: &HashSet<String>) {
        write_lock(&self.values).retain(|name, _| keep.contains(name));
    }
}

fn stale(previous: Option<&TagValue>, error: String, ts_ms: i64) -> TagValue {
    TagValue {
        data: previous.and_then(|prev| prev.data.clone()),
        raw: previous.map(|prev| prev.raw.clone()).unwrap_or_default(),
        error: Some(error),
        updated_at_ms: ts_ms,
    }
}
