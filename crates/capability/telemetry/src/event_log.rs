//! 用户可见的调试事件日志（注入式，替代进程级全局存储）。

use domain::now_epoch_ms;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// 单条日志记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    /// 来源：PLC 名或触发器名
    pub source: String,
    pub message: String,
    pub ts_ms: i64,
}

impl LogEntry {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            message: message.into(),
            ts_ms: now_epoch_ms(),
        }
    }
}

/// 事件日志接口。
pub trait EventLog: Send + Sync {
    fn record(&self, entry: LogEntry);

    fn info(&self, source: &str, message: String) {
        self.record(LogEntry::new(LogLevel::Info, source, message));
    }

    fn warn(&self, source: &str, message: String) {
        self.record(LogEntry::new(LogLevel::Warn, source, message));
    }

    fn error(&self, source: &str, message: String) {
        self.record(LogEntry::new(LogLevel::Error, source, message));
    }
}

/// 仅转发到 tracing 的事件日志。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn record(&self, entry: LogEntry) {
        emit(&entry);
    }
}

/// 内存环形缓冲事件日志：保留最近 `capacity` 条，同时转发到 tracing。
#[derive(Debug)]
pub struct MemoryEventLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl MemoryEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// 按时间顺序返回当前保留的记录。
    pub fn entries(&self) -> Vec<LogEntry> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.iter().cloned().collect()
    }

    /// 返回指定来源的记录。
    pub fn entries_for(&self, source: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.source == source)
            .collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl EventLog for MemoryEventLog {
    fn record(&self, entry: LogEntry) {
        emit(&entry);
        if self.capacity == 0 {
            return;
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

fn emit(entry: &LogEntry) {
    match entry.level {
        LogLevel::Debug => {
            tracing::debug!(target: "plcgw.events", source = %entry.source, "{}", entry.message)
        }
        LogLevel::Info => {
            tracing::info!(target: "plcgw.events", source = %entry.source, "{}", entry.message)
        }
        LogLevel::Warn => {
            tracing::warn!(target: "plcgw.events", source = %entry.source, "{}", entry.message)
        }
        LogLevel::Error => {
            tracing::error!(target: "plcgw.events", source = %entry.source, "{}", entry.message)
        }
    }
}
