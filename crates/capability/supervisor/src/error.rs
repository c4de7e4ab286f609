use plcgw_driver::DriverError;

/// 监管器错误。
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("unknown plc: {0}")]
    UnknownPlc(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("plc not connected: {0}")]
    NotConnected(String),
    #[error("driver error: {0}")]
    Driver(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("tag not writable: {0}")]
    NotWritable(String),
}

impl From<DriverError> for SupervisorError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Timeout(message) => SupervisorError::Timeout(message),
            DriverError::NotConnected => SupervisorError::NotConnected("session closed".to_string()),
            other => SupervisorError::Driver(other.to_string()),
        }
    }
}
