//! In-process log store with severity filtering and bounded retention.
//!
//! # Responsibilities
//! - Keep the last N log entries for inspection through the admin API
//! - Drop entries below a configurable minimum level
//! - Capture a backtrace for error and critical entries
//! - Mirror entries to `tracing` (only error/critical in production)
//! - Funnel panics into the store
//!
//! # Design Decisions
//! - One logger with a level threshold; a "silent" logger is just
//!   `min_level = critical`
//! - Threshold and production flag are atomics so config reloads never block
//!   writers
//! - Error listeners run after the buffer lock is released

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LoggingConfig;
use crate::observability::metrics;
use crate::observability::ring::RingBuffer;
use crate::time::epoch_millis;

/// Severity of a log entry.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Critical = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }

    /// Error and critical entries carry a stack trace and are always mirrored.
    pub fn is_severe(&self) -> bool {
        *self >= LogLevel::Error
    }
}

impl From<u8> for LogLevel {
    fn from(val: u8) -> Self {
        match val {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Critical,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// A single stored log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub level: LogLevel,
    pub module: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Selection of entries returned by [`SystemLogger::entries`].
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub min_level: Option<LogLevel>,
    pub module: Option<String>,
    /// Keep only the most recent `limit` matches.
    pub limit: Option<usize>,
}

impl LogFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.min_level {
            if entry.level < level {
                return false;
            }
        }
        match &self.module {
            Some(module) => entry.module == *module,
            None => true,
        }
    }
}

/// Callback invoked for every stored error or critical entry.
pub type ErrorListener = Box<dyn Fn(&LogEntry) + Send + Sync>;

/// Bounded, level-filtered log store.
pub struct SystemLogger {
    entries: Mutex<RingBuffer<LogEntry>>,
    min_level: AtomicU8,
    production: AtomicBool,
    listeners: RwLock<Vec<ErrorListener>>,
}

impl SystemLogger {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            entries: Mutex::new(RingBuffer::new(config.capacity)),
            min_level: AtomicU8::new(config.min_level as u8),
            production: AtomicBool::new(config.production),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn debug(&self, module: &str, message: &str, data: Option<Value>) {
        self.log(LogLevel::Debug, module, message, data);
    }

    pub fn info(&self, module: &str, message: &str, data: Option<Value>) {
        self.log(LogLevel::Info, module, message, data);
    }

    pub fn warn(&self, module: &str, message: &str, data: Option<Value>) {
        self.log(LogLevel::Warn, module, message, data);
    }

    pub fn error(&self, module: &str, message: &str, data: Option<Value>) {
        self.log(LogLevel::Error, module, message, data);
    }

    pub fn critical(&self, module: &str, message: &str, data: Option<Value>) {
        self.log(LogLevel::Critical, module, message, data);
    }

    /// Store an entry if `level` passes the threshold.
    pub fn log(&self, level: LogLevel, module: &str, message: &str, data: Option<Value>) {
        if level < self.min_level() {
            return;
        }

        let stack_trace = level
            .is_severe()
            .then(|| std::backtrace::Backtrace::force_capture().to_string());

        let entry = LogEntry {
            timestamp: epoch_millis(),
            level,
            module: module.to_string(),
            message: message.to_string(),
            data,
            stack_trace,
        };

        if level.is_severe() || !self.production.load(Ordering::Relaxed) {
            mirror(&entry);
        }
        metrics::record_log_entry(level.as_str());

        let notify = level.is_severe();
        let snapshot = notify.then(|| entry.clone());
        self.lock_entries().push(entry);

        if let Some(entry) = snapshot {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            for listener in listeners.iter() {
                listener(&entry);
            }
        }
    }

    /// Matching entries, oldest first.
    pub fn entries(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let buffer = self.lock_entries();
        let mut matched: Vec<LogEntry> = buffer
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from(self.min_level.load(Ordering::Relaxed))
    }

    pub fn set_min_level(&self, level: LogLevel) {
        let previous = LogLevel::from(self.min_level.swap(level as u8, Ordering::Relaxed));
        if previous != level {
            tracing::info!(from = %previous, to = %level, "Log store level changed");
        }
    }

    pub fn set_production(&self, production: bool) {
        self.production.store(production, Ordering::Relaxed);
    }

    /// Register a callback for error and critical entries.
    pub fn add_error_listener(&self, listener: ErrorListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Serialize the stored entries as a JSON array.
    pub fn export_json(&self) -> serde_json::Result<String> {
        let buffer = self.lock_entries();
        let entries: Vec<&LogEntry> = buffer.iter().collect();
        serde_json::to_string(&entries)
    }

    /// Route panics from any thread into `error()`, then run the previous hook.
    ///
    /// The hook holds a weak reference; once the logger is dropped panics go
    /// straight to the previous hook.
    pub fn install_panic_hook(self: &Arc<Self>) {
        let logger = Arc::downgrade(self);
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            if let Some(logger) = logger.upgrade() {
                let location = info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                let thread = std::thread::current().name().map(str::to_string);
                logger.error(
                    "panic",
                    &panic_message(info.payload()),
                    Some(serde_json::json!({ "location": location, "thread": thread })),
                );
            }
            previous(info);
        }));
    }

    fn lock_entries(&self) -> MutexGuard<'_, RingBuffer<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SystemLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemLogger")
            .field("min_level", &self.min_level())
            .field("production", &self.production.load(Ordering::Relaxed))
            .field("len", &self.len())
            .finish()
    }
}

fn mirror(entry: &LogEntry) {
    let module = entry.module.as_str();
    let data = entry.data.as_ref();
    match entry.level {
        LogLevel::Debug => tracing::debug!(module, data = ?data, "{}", entry.message),
        LogLevel::Info => tracing::info!(module, data = ?data, "{}", entry.message),
        LogLevel::Warn => tracing::warn!(module, data = ?data, "{}", entry.message),
        LogLevel::Error => tracing::error!(module, data = ?data, "{}", entry.message),
        LogLevel::Critical => {
            tracing::error!(module, data = ?data, critical = true, "{}", entry.message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
