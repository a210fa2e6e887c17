//! Structured server log.
//!
//! The event loop appends one [`LogEntry`] per login, logout and relayed
//! chat message, in processing order. Where the entries end up is up to the
//! [`LogSink`] the server was started with.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fmt;
use tracing::info;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    LoggedIn,
    LoggedOut,
    Message(String),
}

/// One append-only record of the server log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub actor: String,
    pub event: LogEvent,
}

impl LogEntry {
    /// Create an entry stamped with the current local time.
    pub fn now(actor: &str, event: LogEvent) -> Self {
        Self {
            timestamp: Local::now(),
            actor: actor.to_string(),
            event,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.format("%H:%M:%S%.3f");
        match &self.event {
            LogEvent::LoggedIn => write!(f, "{time} {} logged in", self.actor),
            LogEvent::LoggedOut => write!(f, "{time} {} logged out", self.actor),
            LogEvent::Message(text) => write!(f, "{time} {}: {text}", self.actor),
        }
    }
}

/// Destination for server log entries.
///
/// Called from the event loop thread; implementations must not block for
/// long.
pub trait LogSink: Send + Sync {
    fn append(&self, entry: LogEntry);
}

/// In-memory log keeping every entry for the life of the process.
#[derive(Debug, Default)]
pub struct ServerLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl ServerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in append order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Plain-text rendering, one line per entry.
    pub fn render(&self) -> String {
        let entries = self.entries.lock();
        let mut out = String::new();
        for entry in entries.iter() {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

impl LogSink for ServerLog {
    fn append(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }
}

/// Sink that forwards entries to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, entry: LogEntry) {
        match &entry.event {
            LogEvent::LoggedIn => info!(actor = %entry.actor, "logged in"),
            LogEvent::LoggedOut => info!(actor = %entry.actor, "logged out"),
            LogEvent::Message(text) => info!(actor = %entry.actor, text = %text, "message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon(actor: &str, event: LogEvent) -> LogEntry {
        LogEntry {
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 5).unwrap(),
            actor: actor.to_string(),
            event,
        }
    }

    #[test]
    fn test_entry_rendering() {
        assert_eq!(
            at_noon("alice", LogEvent::LoggedIn).to_string(),
            "12:00:05.000 alice logged in"
        );
        assert_eq!(
            at_noon("alice", LogEvent::Message("hi all".into())).to_string(),
            "12:00:05.000 alice: hi all"
        );
        assert_eq!(
            at_noon("bob", LogEvent::LoggedOut).to_string(),
            "12:00:05.000 bob logged out"
        );
    }

    #[test]
    fn test_server_log_keeps_order() {
        let log = ServerLog::new();
        assert!(log.is_empty());

        log.append(at_noon("alice", LogEvent::LoggedIn));
        log.append(at_noon("alice", LogEvent::Message("one".into())));
        log.append(at_noon("alice", LogEvent::LoggedOut));

        let events: Vec<LogEvent> = log.entries().into_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                LogEvent::LoggedIn,
                LogEvent::Message("one".into()),
                LogEvent::LoggedOut
            ]
        );
        assert_eq!(log.render().lines().count(), 3);
    }
}
