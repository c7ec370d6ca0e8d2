//! # Event Log
//!
//! Audit sink shared by every stage of a quarantine analysis. Components never
//! reach for a global logger; they are handed an `Arc<dyn EventSink>` when they
//! are constructed and report through it.
//!
//! ```rust
//! use event_log::{EventSink, Level, MemoryEventLog};
//!
//! let sink = MemoryEventLog::new();
//! sink.record(Level::Info, "workspace created");
//! sink.warn("no output received");
//! assert_eq!(sink.records().len(), 2);
//! ```

mod file;
mod memory;

pub use file::{format_line, FileEventLog, LogError};
pub use memory::{MemoryEventLog, Record};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity attached to every audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging collaborator injected into each pipeline component.
///
/// Implementations must be cheap to call and must never fail the caller: the
/// log is a side channel, so write errors are swallowed by the sink itself.
pub trait EventSink: Send + Sync {
    fn record(&self, level: Level, message: &str);

    fn flush(&self) {}

    fn debug(&self, message: &str) {
        self.record(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.record(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.record(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.record(Level::Error, message);
    }
}

/// Sink that only forwards to `tracing`. Used when no audit file is wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, level: Level, message: &str) {
        emit_tracing(level, message);
    }
}

pub(crate) fn emit_tracing(level: Level, message: &str) {
    match level {
        Level::Debug => tracing::debug!(target: "quarantine.audit", "{}", message),
        Level::Info => tracing::info!(target: "quarantine.audit", "{}", message),
        Level::Warning => tracing::warn!(target: "quarantine.audit", "{}", message),
        Level::Error => tracing::error!(target: "quarantine.audit", "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_render_uppercase() {
        assert_eq!(Level::Info.to_string(), "INFO");
        assert_eq!(Level::Warning.to_string(), "WARNING");
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warning < Level::Error);
    }
}
