//! PLC 网关装配层：运行时装配与配置编辑门面。

pub mod assembly;
pub mod gateway;

pub use gateway::{BootReport, Gateway, GatewayError};
