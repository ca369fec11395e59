//! Logging collaborator.
//!
//! The engine reports loading problems, transformation warnings and conflict
//! diagnostics through a [`LogSink`] that the caller hands to the
//! [`Grammar`](crate::Grammar). By default everything goes to [`tracing`].

use std::sync::{
    Arc,
    Mutex,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum Level {
    #[display(fmt = "info")]
    Info,
    #[display(fmt = "warning")]
    Warning,
    #[display(fmt = "error")]
    Error,
}

pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Forwards to `tracing` with target `cgrammar`.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(target: "cgrammar", "{}", message),
            Level::Warning => tracing::warn!(target: "cgrammar", "{}", message),
            Level::Error => tracing::error!(target: "cgrammar", "{}", message),
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages logged at `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages(level).iter().any(|m| m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push((level, message.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_records_messages_by_level() {
        let sink = MemorySink::new();
        sink.info("loaded 3 productions");
        sink.warning("skipping line 4");
        sink.error("file not found");

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.messages(Level::Warning), vec!["skipping line 4"]);
        assert!(sink.contains(Level::Error, "not found"));
        assert!(!sink.contains(Level::Info, "not found"));
    }
}
