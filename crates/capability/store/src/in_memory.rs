//! 配置存储内存实现
//!
//! 可选持久化：每次编辑后整体写入临时文件再原子替换目标文件。

use crate::error::StoreError;
use crate::models::{ConfigDocument, KafkaClusterConfig, MqttBrokerConfig};
use crate::traits::ConfigStore;
use domain::{PlcConfig, TagPack, TriggerConfig};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// 按名称唯一的配置记录
trait Named {
    fn name(&self) -> &str;
}

impl Named for PlcConfig {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for TriggerConfig {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for TagPack {
    fn name(&self) -> &str {
        &self.name
    }
}

fn find<T: Named + Clone>(records: &[T], name: &str) -> Option<T> {
    records.iter().find(|record| record.name() == name).cloned()
}

fn insert<T: Named>(records: &mut Vec<T>, record: T, kind: &str) -> Result<(), StoreError> {
    if records.iter().any(|existing| existing.name() == record.name()) {
        return Err(StoreError::new(format!(
            "{} {} already exists",
            kind,
            record.name()
        )));
    }
    records.push(record);
    Ok(())
}

fn remove<T: Named>(records: &mut Vec<T>, name: &str) -> bool {
    let before = records.len();
    records.retain(|record| record.name() != name);
    records.len() != before
}

fn replace<T: Named>(records: &mut [T], name: &str, record: T, kind: &str) -> Result<(), StoreError> {
    if record.name() != name && records.iter().any(|existing| existing.name() == record.name()) {
        return Err(StoreError::new(format!(
            "{} {} already exists",
            kind,
            record.name()
        )));
    }
    let slot = records
        .iter_mut()
        .find(|existing| existing.name() == name)
        .ok_or_else(|| StoreError::new(format!("{} {} not found", kind, name)))?;
    *slot = record;
    Ok(())
}

/// 配置内存存储
pub struct InMemoryConfigStore {
    document: RwLock<ConfigDocument>,
    persist_path: Option<PathBuf>,
}

impl InMemoryConfigStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::from_document(ConfigDocument::default())
    }

    pub fn from_document(document: ConfigDocument) -> Self {
        Self {
            document: RwLock::new(document),
            persist_path: None,
        }
    }

    /// 从 JSON 文本加载
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        let document: ConfigDocument = serde_json::from_str(raw)?;
        Ok(Self::from_document(document))
    }

    /// 从文件加载，并将后续编辑写回该文件；文件不存在时以空配置启动
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let document = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ConfigDocument::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self::from_document(document).with_persist_path(path))
    }

    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// 导出当前配置文档（格式化 JSON）
    pub fn to_json(&self) -> Result<String, StoreError> {
        let document = self.read()?;
        Ok(serde_json::to_string_pretty(&*document)?)
    }

    pub fn document(&self) -> Result<ConfigDocument, StoreError> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, ConfigDocument>, StoreError> {
        self.document
            .read()
            .map_err(|_| StoreError::new("lock failed"))
    }

    /// 在写锁内修改文档；修改成功后持久化，持久化失败则回滚
    fn edit<R>(
        &self,
        apply: impl FnOnce(&mut ConfigDocument) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut document = self
            .document
            .write()
            .map_err(|_| StoreError::new("lock failed"))?;
        let snapshot = document.clone();
        let result = apply(&mut *document)?;
        if let Some(path) = &self.persist_path {
            if let Err(err) = persist(path, &document) {
                *document = snapshot;
                return Err(err);
            }
        }
        Ok(result)
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

fn persist(path: &Path, document: &ConfigDocument) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(document)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, raw)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl ConfigStore for InMemoryConfigStore {
    fn find_plc(&self, name: &str) -> Result<Option<PlcConfig>, StoreError> {
        Ok(find(&self.read()?.plcs, name))
    }

    fn list_plcs(&self) -> Result<Vec<PlcConfig>, StoreError> {
        Ok(self.read()?.plcs.clone())
    }

    fn add_plc(&self, config: PlcConfig) -> Result<(), StoreError> {
        self.edit(|document| insert(&mut document.plcs, config, "plc"))
    }

    fn remove_plc(&self, name: &str) -> Result<bool, StoreError> {
        self.edit(|document| Ok(remove(&mut document.plcs, name)))
    }

    fn update_plc(&self, name: &str, config: PlcConfig) -> Result<(), StoreError> {
        self.edit(|document| replace(&mut document.plcs, name, config, "plc"))
    }

    fn find_trigger(&self, name: &str) -> Result<Option<TriggerConfig>, StoreError> {
        Ok(find(&self.read()?.triggers, name))
    }

    fn list_triggers(&self) -> Result<Vec<TriggerConfig>, StoreError> {
        Ok(self.read()?.triggers.clone())
    }

    fn add_trigger(&self, config: TriggerConfig) -> Result<(), StoreError> {
        self.edit(|document| insert(&mut document.triggers, config, "trigger"))
    }

    fn remove_trigger(&self, name: &str) -> Result<bool, StoreError> {
        self.edit(|document| Ok(remove(&mut document.triggers, name)))
    }

    fn update_trigger(&self, name: &str, config: TriggerConfig) -> Result<(), StoreError> {
        self.edit(|document| replace(&mut document.triggers, name, config, "trigger"))
    }

    fn list_packs(&self) -> Result<Vec<TagPack>, StoreError> {
        Ok(self.read()?.packs.clone())
    }

    fn upsert_pack(&self, pack: TagPack) -> Result<(), StoreError> {
        self.edit(|document| {
            match document.packs.iter_mut().find(|existing| existing.name == pack.name) {
                Some(existing) => *existing = pack,
                None => document.packs.push(pack),
            }
            Ok(())
        })
    }

    fn remove_pack(&self, name: &str) -> Result<bool, StoreError> {
        self.edit(|document| Ok(remove(&mut document.packs, name)))
    }

    fn list_brokers(&self) -> Result<Vec<MqttBrokerConfig>, StoreError> {
        Ok(self.read()?.brokers.clone())
    }

    fn list_clusters(&self) -> Result<Vec<KafkaClusterConfig>, StoreError> {
        Ok(self.read()?.clusters.clone())
    }
}
