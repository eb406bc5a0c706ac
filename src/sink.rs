//! Logging sink passed explicitly into every pipeline component.
//!
//! Components never log through a global; they receive a `&dyn LogSink`
//! and emit [`LogRecord`]s tagged with a category (`NETWORK`, `TRANSCODE`,
//! …). [`TracingSink`] forwards records to `tracing`, which is what the
//! library uses by default. Tests use [`NullSink`] or [`MemorySink`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

/// Severity of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub category: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Receiver for pipeline log records.
pub trait LogSink: Send + Sync {
    fn record(&self, record: LogRecord);

    fn debug(&self, category: &'static str, message: String) {
        self.record(LogRecord {
            level: LogLevel::Debug,
            category,
            message,
            details: None,
        });
    }

    fn info(&self, category: &'static str, message: String) {
        self.record(LogRecord {
            level: LogLevel::Info,
            category,
            message,
            details: None,
        });
    }

    fn warn(&self, category: &'static str, message: String) {
        self.record(LogRecord {
            level: LogLevel::Warn,
            category,
            message,
            details: None,
        });
    }

    fn error(&self, category: &'static str, message: String, details: Option<Value>) {
        self.record(LogRecord {
            level: LogLevel::Error,
            category,
            message,
            details,
        });
    }
}

/// Forwards records to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, r: LogRecord) {
        let details = r.details.as_ref().map(|d| d.to_string());
        let details = details.as_deref().unwrap_or("");
        match r.level {
            LogLevel::Debug => tracing::debug!(category = r.category, details, "{}", r.message),
            LogLevel::Info => tracing::info!(category = r.category, details, "{}", r.message),
            LogLevel::Warn => tracing::warn!(category = r.category, details, "{}", r.message),
            LogLevel::Error => tracing::error!(category = r.category, details, "{}", r.message),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn record(&self, _record: LogRecord) {}
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far.
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Records in `category` at or above `level`.
    pub fn matching(&self, category: &str, level: LogLevel) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.category == category && r.level >= level)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn record(&self, record: LogRecord) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
