//! 网关核心数据模型：PLC 配置、标签值、触发器配置与运行时视图。

pub mod data;
pub mod plc;
pub mod trigger;

pub use data::{
    DeviceIdentity, StructureTemplate, TagData, TagInfo, TagValue, TemplateMember, now_epoch_ms,
};
pub use plc::{
    ConnectionStatus, FamilyKind, PlcConfig, PlcEvent, PlcEventKind, PlcFamily, PlcView,
    PollStats, TagSelection,
};
pub use trigger::{
    CompareValue, Condition, DataSource, Operator, PackMember, SinkSelector, TagPack,
    TriggerConfig, TriggerStatus, TriggerStatusView,
};
