//! Shared test helpers for retrofix crates.
//!
//! [`RecordingLog`] captures records in memory so tests can assert on what a
//! component reported without touching the global `log` state.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::Mutex;

/// A single captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    /// Severity of the record.
    pub level: Level,
    /// Target the record was emitted under.
    pub target: String,
    /// Rendered message text.
    pub message: String,
}

/// In-memory `log::Log` implementation for tests.
#[derive(Debug)]
pub struct RecordingLog {
    max_level: LevelFilter,
    records: Mutex<Vec<Captured>>,
}

impl Default for RecordingLog {
    fn default() -> Self {
        Self::with_max_level(LevelFilter::Trace)
    }
}

impl RecordingLog {
    /// Creates a recorder that accepts records up to `max_level`.
    #[must_use]
    pub fn with_max_level(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of every captured record.
    #[must_use]
    pub fn records(&self) -> Vec<Captured> {
        self.records
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |records| records.clone())
    }

    /// Returns the rendered messages in emission order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    /// Returns the messages captured at exactly `level`.
    #[must_use]
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .map(|r| r.message)
            .collect()
    }

    /// Returns true when any captured message at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages_at(level).iter().any(|m| m.contains(needle))
    }
}

impl Log for RecordingLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let captured = Captured {
            level: record.level(),
            target: record.target().to_owned(),
            message: record.args().to_string(),
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(captured);
        }
    }

    fn flush(&self) {}
}
