use crate::{Driver, DriverError};
use domain::{FamilyKind, PlcConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// 协议族驱动工厂：每次建立会话时构造新的驱动实例。
pub trait DriverFactory: Send + Sync {
    fn create(&self, config: &PlcConfig) -> Result<Arc<dyn Driver>, DriverError>;
}

/// 协议族 → 驱动工厂 映射。
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<FamilyKind, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: FamilyKind, factory: Arc<dyn DriverFactory>) {
        self.factories.insert(kind, factory);
    }

    pub fn with(mut self, kind: FamilyKind, factory: Arc<dyn DriverFactory>) -> Self {
        self.register(kind, factory);
        self
    }

    /// 同一工厂注册到所有协议族（模拟模式）。
    pub fn with_all(mut self, factory: Arc<dyn DriverFactory>) -> Self {
        for kind in [
            FamilyKind::Logix,
            FamilyKind::S7,
            FamilyKind::Beckhoff,
            FamilyKind::Omron,
        ] {
            self.register(kind, factory.clone());
        }
        self
    }

    /// 查找协议族对应的工厂（`add_plc` 时调用一次）。
    pub fn factory(&self, kind: FamilyKind) -> Result<Arc<dyn DriverFactory>, DriverError> {
        self.factories
            .get(&kind)
            .cloned()
            .ok_or_else(|| DriverError::Config(format!("no driver registered for family {}", kind)))
    }

    pub fn supports(&self, kind: FamilyKind) -> bool {
        self.factories.contains_key(&kind)
    }
}
