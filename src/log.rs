//! Bounded log of every TX/RX/ERR hex payload, shared with external
//! observers under its own lock.
//!
//! Capacity 500, grounded on the original Python emulation harness's
//! `collections.deque(maxlen=500)`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::LOG_RING_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogDirection {
    Tx,
    Rx,
    Err,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: LogDirection,
    pub hex: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, direction: LogDirection, bytes: &[u8]) -> Self {
        Self { timestamp, direction, hex: bytes.iter().map(|b| format!("{:02x}", b)).collect() }
    }
}

/// Ring buffer holding up to [`LOG_RING_CAPACITY`] entries, oldest evicted
/// first. Readers get a read-only snapshot (`Vec<LogEntry>` copy) rather
/// than a reference, so they never hold the lock across a workflow step.
pub struct LogSink {
    entries: Mutex<VecDeque<LogEntry>>,
    pushed: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self { entries: Mutex::new(VecDeque::with_capacity(LOG_RING_CAPACITY)), pushed: AtomicU64::new(0) }
    }

    pub fn push(&self, direction: LogDirection, bytes: &[u8]) {
        let entry = LogEntry::new(Utc::now(), direction, bytes);
        let mut entries = self.entries.lock().expect("log sink mutex poisoned");
        if entries.len() == LOG_RING_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
        self.pushed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().expect("log sink mutex poisoned").iter().cloned().collect()
    }

    /// A monotonic marker usable with [`Self::since`] to later retrieve just
    /// the entries appended after this call, for per-operation log traces
    /// (`driver::Pn532Driver`'s per-call results).
    pub fn mark(&self) -> u64 {
        self.pushed.load(Ordering::SeqCst)
    }

    /// Entries appended since `mark`. If more than [`LOG_RING_CAPACITY`]
    /// entries were pushed in the meantime, only the surviving tail is
    /// returned — older ones were already evicted from the ring.
    pub fn since(&self, mark: u64) -> Vec<LogEntry> {
        let entries = self.entries.lock().expect("log sink mutex poisoned");
        let appended = self.pushed.load(Ordering::SeqCst).saturating_sub(mark) as usize;
        let take = appended.min(entries.len());
        entries.iter().skip(entries.len() - take).cloned().collect()
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_entry_past_capacity() {
        let sink = LogSink::new();
        for i in 0..(LOG_RING_CAPACITY + 10) {
            sink.push(LogDirection::Tx, &[i as u8]);
        }
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), LOG_RING_CAPACITY);
        assert_eq!(snapshot.first().unwrap().hex, format!("{:02x}", 10u8));
    }

    #[test]
    fn hex_formatting_is_lowercase_no_separators() {
        let entry = LogEntry::new(Utc::now(), LogDirection::Rx, &[0xAB, 0x01, 0xFF]);
        assert_eq!(entry.hex, "ab01ff");
    }

    #[test]
    fn since_returns_only_entries_pushed_after_the_mark() {
        let sink = LogSink::new();
        sink.push(LogDirection::Tx, &[0x01]);
        let mark = sink.mark();
        sink.push(LogDirection::Tx, &[0x02]);
        sink.push(LogDirection::Rx, &[0x03]);

        let since = sink.since(mark);
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].hex, "02");
        assert_eq!(since[1].hex, "03");
    }

    #[test]
    fn since_is_empty_when_nothing_pushed_after_the_mark() {
        let sink = LogSink::new();
        sink.push(LogDirection::Tx, &[0x01]);
        let mark = sink.mark();
        assert!(sink.since(mark).is_empty());
    }
}
