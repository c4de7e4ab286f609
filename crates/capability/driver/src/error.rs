//! 驱动错误类型定义

/// 驱动调用错误
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// 连接建立失败
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 超时
    #[error("timeout: {0}")]
    Timeout(String),

    /// 批量读失败（整批）
    #[error("read error: {0}")]
    Read(String),

    /// 单点写失败
    #[error("write error: {0}")]
    Write(String),

    /// 协议族不支持该操作
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// 会话未建立或已关闭
    #[error("not connected")]
    NotConnected,

    /// 配置不可用（如协议族未注册）
    #[error("config error: {0}")]
    Config(String),
}
