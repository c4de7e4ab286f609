/// 触发引擎错误。
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),
    #[error("trigger already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unknown plc: {0}")]
    UnknownPlc(String),
    #[error("unknown pack: {0}")]
    UnknownPack(String),
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
}
