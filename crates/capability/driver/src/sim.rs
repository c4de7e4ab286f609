//! 内存模拟驱动。
//!
//! `SimDevice` 是一台虚拟 PLC 的标签表，可在测试中直接改写；
//! `SimFactory` 按地址为每台虚拟 PLC 保留一个 `SimDevice`，每次会话创建新的 `SimDriver`。

use crate::{Driver, DriverError, DriverFactory};
use async_trait::async_trait;
use domain::{
    DeviceIdentity, PlcConfig, StructureTemplate, TagData, TagInfo, TagValue, now_epoch_ms,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

#[derive(Default)]
struct DeviceState {
    tags: RwLock<HashMap<String, TagData>>,
    tag_errors: RwLock<HashMap<String, String>>,
    templates: RwLock<HashMap<u16, StructureTemplate>>,
    read_only: RwLock<HashSet<String>>,
    writes: Mutex<Vec<(String, TagData)>>,
    identity: RwLock<Option<DeviceIdentity>>,
    read_delay: RwLock<Option<Duration>>,
    fail_connect: AtomicBool,
    fail_reads: AtomicBool,
    reads: AtomicU64,
    sessions: AtomicU64,
}

/// 虚拟 PLC（可克隆句柄，所有克隆共享同一张标签表）。
#[derive(Clone, Default)]
pub struct SimDevice {
    state: Arc<DeviceState>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tag(&self, name: impl Into<String>, value: TagData) {
        let name = name.into();
        write_lock(&self.state.tag_errors).remove(&name);
        write_lock(&self.state.tags).insert(name, value);
    }

    pub fn tag(&self, name: &str) -> Option<TagData> {
        read_lock(&self.state.tags).get(name).cloned()
    }

    pub fn remove_tag(&self, name: &str) {
        write_lock(&self.state.tags).remove(name);
    }

    /// 让单个标签的读取返回错误。
    pub fn set_tag_error(&self, name: impl Into<String>, error: impl Into<String>) {
        write_lock(&self.state.tag_errors).insert(name.into(), error.into());
    }

    pub fn set_read_only(&self, name: impl Into<String>) {
        write_lock(&self.state.read_only).insert(name.into());
    }

    pub fn set_identity(&self, identity: DeviceIdentity) {
        *write_lock(&self.state.identity) = Some(identity);
    }

    pub fn add_template(&self, template: StructureTemplate) {
        write_lock(&self.state.templates).insert(template.type_code, template);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// 让整批读取失败（模拟链路中断）。
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *write_lock(&self.state.read_delay) = delay;
    }

    /// 按时间顺序返回驱动收到的写请求。
    pub fn writes(&self) -> Vec<(String, TagData)> {
        self.state
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn read_count(&self) -> u64 {
        self.state.reads.load(Ordering::SeqCst)
    }

    /// 已建立的会话次数。
    pub fn session_count(&self) -> u64 {
        self.state.sessions.load(Ordering::SeqCst)
    }
}

/// 单个会话的模拟驱动。
pub struct SimDriver {
    device: SimDevice,
    connected: AtomicBool,
}

impl SimDriver {
    pub fn new(device: SimDevice) -> Self {
        Self {
            device,
            connected: AtomicBool::new(false),
        }
    }

    fn ensure_connected(&self) -> Result<(), DriverError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::NotConnected)
        }
    }
}

#[async_trait]
impl Driver for SimDriver {
    async fn connect(&self, address: &str, _timeout: Duration) -> Result<(), DriverError> {
        if self.device.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::Connection(format!("{} refused connection", address)));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.device.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DriverError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn discover_tags(&self) -> Result<Vec<TagInfo>, DriverError> {
        self.ensure_connected()?;
        let read_only = read_lock(&self.device.state.read_only);
        let mut tags: Vec<TagInfo> = read_lock(&self.device.state.tags)
            .iter()
            .map(|(name, value)| TagInfo {
                name: name.clone(),
                data_type: Some(value.type_name().to_string()),
                writable: !read_only.contains(name),
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn read_tags(&self, names: &[String]) -> Result<HashMap<String, TagValue>, DriverError> {
        self.ensure_connected()?;
        let delay = *read_lock(&self.device.state.read_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.device.state.reads.fetch_add(1, Ordering::SeqCst);
        if self.device.state.fail_reads.load(Ordering::SeqCst) {
            return Err(DriverError::Read("simulated link failure".to_string()));
        }

        let ts_ms = now_epoch_ms();
        let tags = read_lock(&self.device.state.tags);
        let errors = read_lock(&self.device.state.tag_errors);
        let mut values = HashMap::with_capacity(names.len());
        for name in names {
            let value = if let Some(error) = errors.get(name) {
                TagValue::failed(error.clone(), ts_ms)
            } else {
                match tags.get(name) {
                    Some(data) => TagValue::ok(data.clone(), encode_raw(data), ts_ms),
                    None => TagValue::failed(format!("tag {} not found", name), ts_ms),
                }
            };
            values.insert(name.clone(), value);
        }
        Ok(values)
    }

    async fn write_tag(&self, name: &str, value: &TagData) -> Result<(), DriverError> {
        self.ensure_connected()?;
        if read_lock(&self.device.state.read_only).contains(name) {
            return Err(DriverError::Write(format!("tag {} is read only", name)));
        }
        self.device
            .state
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((name.to_string(), value.clone()));
        write_lock(&self.device.state.tags).insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn device_info(&self) -> Result<Option<DeviceIdentity>, DriverError> {
        self.ensure_connected()?;
        Ok(read_lock(&self.device.state.identity).clone())
    }

    async fn template(&self, type_code: u16) -> Result<StructureTemplate, DriverError> {
        self.ensure_connected()?;
        read_lock(&self.device.state.templates)
            .get(&type_code)
            .cloned()
            .ok_or_else(|| {
                DriverError::Unsupported(format!("structure template {} not found", type_code))
            })
    }
}

/// 模拟驱动工厂：按 PLC 地址复用虚拟设备。
#[derive(Default)]
pub struct SimFactory {
    devices: RwLock<HashMap<String, SimDevice>>,
}

impl SimFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取（或创建）指定地址的虚拟设备。
    pub fn device(&self, address: &str) -> SimDevice {
        if let Some(device) = read_lock(&self.devices).get(address) {
            return device.clone();
        }
        write_lock(&self.devices)
            .entry(address.to_string())
            .or_default()
            .clone()
    }
}

impl DriverFactory for SimFactory {
    fn create(&self, config: &PlcConfig) -> Result<Arc<dyn Driver>, DriverError> {
        let device = self.device(&config.address);
        let seeded = !read_lock(&device.state.tags).is_empty();
        if !seeded {
            // 未预置的设备按声明类型填充初值，便于演示模式直接轮询
            for selection in &config.tags {
                let value = initial_value(selection.data_type.as_deref());
                write_lock(&device.state.tags)
                    .entry(selection.name.clone())
                    .or_insert(value);
            }
        }
        Ok(Arc::new(SimDriver::new(device)))
    }
}

fn initial_value(data_type: Option<&str>) -> TagData {
    match data_type.map(|value| value.to_ascii_uppercase()).as_deref() {
        Some("BOOL") => TagData::Bool(false),
        Some("REAL") | Some("LREAL") | Some("FLOAT") => TagData::Float(0.0),
        Some("STRING") => TagData::String(String::new()),
        _ => TagData::Int(0),
    }
}

fn encode_raw(data: &TagData) -> Vec<u8> {
    match data {
        TagData::Bool(value) => vec![u8::from(*value)],
        TagData::Int(value) => value.to_le_bytes().to_vec(),
        TagData::Float(value) => value.to_le_bytes().to_vec(),
        TagData::String(value) => value.as_bytes().to_vec(),
        TagData::Bytes(value) => value.clone(),
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
