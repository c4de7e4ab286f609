//! 配置存储接口
//!
//! 同步接口：编辑频率低，调用方在持久化成功后再应用到运行时。

use crate::error::StoreError;
use crate::models::{KafkaClusterConfig, MqttBrokerConfig};
use domain::{PlcConfig, TagPack, TriggerConfig};

pub trait ConfigStore: Send + Sync {
    fn find_plc(&self, name: &str) -> Result<Option<PlcConfig>, StoreError>;

    fn list_plcs(&self) -> Result<Vec<PlcConfig>, StoreError>;

    /// 新增 PLC；同名已存在时报错
    fn add_plc(&self, config: PlcConfig) -> Result<(), StoreError>;

    /// 删除 PLC；返回是否存在
    fn remove_plc(&self, name: &str) -> Result<bool, StoreError>;

    /// 替换 PLC 配置（允许改名，新名不得与其他 PLC 冲突）
    fn update_plc(&self, name: &str, config: PlcConfig) -> Result<(), StoreError>;

    fn find_trigger(&self, name: &str) -> Result<Option<TriggerConfig>, StoreError>;

    fn list_triggers(&self) -> Result<Vec<TriggerConfig>, StoreError>;

    fn add_trigger(&self, config: TriggerConfig) -> Result<(), StoreError>;

    fn remove_trigger(&self, name: &str) -> Result<bool, StoreError>;

    fn update_trigger(&self, name: &str, config: TriggerConfig) -> Result<(), StoreError>;

    fn list_packs(&self) -> Result<Vec<TagPack>, StoreError>;

    /// 新增或替换标签包
    fn upsert_pack(&self, pack: TagPack) -> Result<(), StoreError>;

    fn remove_pack(&self, name: &str) -> Result<bool, StoreError>;

    fn list_brokers(&self) -> Result<Vec<MqttBrokerConfig>, StoreError>;

    fn list_clusters(&self) -> Result<Vec<KafkaClusterConfig>, StoreError>;
}
