//! Operator-facing event log.
//!
//! A bounded ring of the most recent status lines. Appends evict the oldest entry once the
//! ring is full. The log is display-only: nothing in the analysis reads it back.

use std::collections::VecDeque;
use std::fmt;

/// Maximum number of entries retained.
pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn marker(self) -> &'static str {
        match self {
            Severity::Info => "ok",
            Severity::Warning => "warn",
            Severity::Error => "error",
        }
    }
}

/// One immutable status line. Ordering is insertion order, tracked by `seq`.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub seq: u64,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity.marker(), self.message)
    }
}

/// Bounded FIFO of status lines.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    next_seq: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            max_entries: MAX_LOG_ENTRIES,
            next_seq: 0,
        }
    }

    /// Append a line, evicting the oldest entries beyond capacity. The line is also
    /// forwarded to the process logger.
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info => log::info!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Error => log::error!("{}", message),
        }

        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            seq: self.next_seq,
            severity,
            message,
        });
        self.next_seq += 1;
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    /// Entries oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entries appended at or after sequence number `seq`, oldest first.
    pub fn since(&self, seq: u64) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.seq >= seq)
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Sequence number the next entry will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_capacity() {
        let mut log = EventLog::new();
        for i in 0..(MAX_LOG_ENTRIES * 3 + 7) {
            log.info(format!("line {i}"));
            assert!(log.len() <= MAX_LOG_ENTRIES);
        }
        assert_eq!(log.len(), MAX_LOG_ENTRIES);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut log = EventLog::new();
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            log.info(format!("line {i}"));
        }
        let messages: Vec<_> = log.entries().map(|e| e.message.clone()).collect();
        assert_eq!(messages.first().unwrap(), "line 5");
        assert_eq!(messages.last().unwrap(), &format!("line {}", MAX_LOG_ENTRIES + 4));
        let seqs: Vec<_> = log.entries().map(|e| e.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] + 1 == w[1]));
    }

    #[test]
    fn since_returns_tail() {
        let mut log = EventLog::new();
        log.info("a");
        let mark = log.next_seq();
        log.warn("b");
        log.error("c");
        let tail: Vec<_> = log.since(mark).map(|e| e.to_string()).collect();
        assert_eq!(tail, vec!["[warn] b", "[error] c"]);
    }

    #[test]
    fn clear_keeps_sequence_monotonic() {
        let mut log = EventLog::new();
        log.info("a");
        log.clear();
        assert!(log.is_empty());
        log.info("b");
        assert_eq!(log.latest().unwrap().seq, 1);
    }
}
