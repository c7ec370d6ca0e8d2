use std::sync::Mutex;

use crate::{EventSink, Level};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub message: String,
}

/// Collects records in memory. Used by tests to assert on the audit trail.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: Mutex<Vec<Record>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.message.contains(needle))
            .count()
    }
}

impl EventSink for MemoryEventLog {
    fn record(&self, level: Level, message: &str) {
        let record = Record {
            level,
            message: message.to_string(),
        };
        match self.records.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
