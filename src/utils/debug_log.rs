use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugLogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

/// 有上限的診斷訊息序列，給外部 debug 面板用。
/// 只作記錄，任何控制流程都不可讀取它來做決策。
#[derive(Clone)]
pub struct DebugLog {
    entries: Arc<Mutex<VecDeque<DebugLogEntry>>>,
    capacity: usize,
    stream: broadcast::Sender<DebugLogEntry>,
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (stream, _) = broadcast::channel(capacity);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            stream,
        }
    }

    pub fn push(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Debug => tracing::debug!("{}", message),
            Severity::Info => tracing::info!("{}", message),
            Severity::Warn => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }

        let entry = DebugLogEntry {
            timestamp: Utc::now(),
            severity,
            message,
        };

        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        // 沒有訂閱者時 send 會失敗，忽略即可
        let _ = self.stream.send(entry);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.push(Severity::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    pub fn entries(&self) -> Vec<DebugLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebugLogEntry> {
        self.stream.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let log = DebugLog::new(3);
        for i in 0..5 {
            log.info(format!("entry {}", i));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "entry 2");
        assert_eq!(entries[2].message, "entry 4");
    }

    #[test]
    fn test_entries_keep_severity_and_order() {
        let log = DebugLog::new(10);
        log.warn("first");
        log.error("second");
        let entries = log.entries();
        assert_eq!(entries[0].severity, Severity::Warn);
        assert_eq!(entries[1].severity, Severity::Error);
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[tokio::test]
    async fn test_stream_delivers_entries() {
        let log = DebugLog::new(10);
        let mut rx = log.subscribe();
        log.debug("hello");
        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.severity, Severity::Debug);
    }
}
