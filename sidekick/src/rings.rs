//! Fixed-capacity FIFO buffers for rolling samples.
//!
//! Two bounded buffers back the supervisor's observability surface:
//!
//! - [`LatencyRing`]: a circular buffer of response-time samples in
//!   milliseconds (capacity 100 by default). Eviction is O(1) - the oldest
//!   sample is overwritten in place rather than shifted out.
//! - [`LogRing`]: a bounded FIFO of captured [`LogEntry`] lines (capacity
//!   1000 by default), fed by sidecar stdout/stderr and supervisor events.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A latency ring shared between the record, the server-side auth wrap, and
/// client proxies.
pub type SharedLatencyRing = Arc<Mutex<LatencyRing>>;

/// A log ring shared between the supervisor and sidecar stdio readers.
pub type SharedLogRing = Arc<Mutex<LogRing>>;

/// Default capacity of the latency ring per service.
pub const LATENCY_RING_CAPACITY: usize = 100;

/// Default capacity of the shared log ring.
pub const LOG_RING_CAPACITY: usize = 1000;

// =============================================================================
// Latency Ring
// =============================================================================

/// Aggregate statistics over the current contents of a [`LatencyRing`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeStats {
    /// Mean of the retained samples, in milliseconds.
    pub avg: f64,
    /// Smallest retained sample, in milliseconds.
    pub min: f64,
    /// Largest retained sample, in milliseconds.
    pub max: f64,
}

impl Default for ResponseTimeStats {
    fn default() -> Self {
        Self {
            avg: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }
}

/// A fixed-size circular buffer of response-time samples.
///
/// Always holds the most recent `capacity` samples. When full, pushing a new
/// sample overwrites the oldest one in place.
#[derive(Clone, Debug)]
pub struct LatencyRing {
    data: Vec<f64>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl LatencyRing {
    /// Creates a new ring with the given capacity.
    ///
    /// A zero capacity is clamped to 1 so that `push` always retains the
    /// newest sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![0.0; capacity],
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Pushes a sample, overwriting the oldest one if the ring is full.
    pub fn push(&mut self, sample_ms: f64) {
        self.data[self.head] = sample_ms;
        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    /// Returns the retained samples in order from oldest to newest.
    pub fn as_vec(&self) -> Vec<f64> {
        if self.len == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.len);
        if self.len < self.capacity {
            out.extend_from_slice(&self.data[..self.len]);
        } else {
            out.extend_from_slice(&self.data[self.head..]);
            out.extend_from_slice(&self.data[..self.head]);
        }
        out
    }

    /// Returns the number of retained samples.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no samples have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Computes avg/min/max over the retained samples.
    ///
    /// Returns all-zero stats when the ring is empty.
    pub fn stats(&self) -> ResponseTimeStats {
        if self.len == 0 {
            return ResponseTimeStats::default();
        }
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &sample in self.as_vec().iter() {
            sum += sample;
            min = min.min(sample);
            max = max.max(sample);
        }
        ResponseTimeStats {
            avg: sum / self.len as f64,
            min,
            max,
        }
    }
}

// =============================================================================
// Log Ring
// =============================================================================

/// Severity of a captured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// A single structured log line attributed to a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was captured.
    pub timestamp: DateTime<Utc>,
    /// The `package.service` key the line belongs to.
    pub service: String,
    /// Severity classification.
    pub level: LogLevel,
    /// The captured line.
    pub message: String,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    pub fn now(service: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            service: service.into(),
            level,
            message: message.into(),
        }
    }
}

/// A bounded FIFO of log entries shared by all services.
///
/// When full, pushing evicts the oldest entry first.
#[derive(Debug)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogRing {
    /// Creates a new log ring with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Appends an entry, evicting the oldest while over capacity.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Returns the most recent `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<LogEntry> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(start).cloned().collect()
    }

    /// Returns the number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been logged yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_ring_keeps_most_recent_window() {
        let mut ring = LatencyRing::new(100);
        for i in 1..=150 {
            ring.push(i as f64);
        }

        assert_eq!(ring.len(), 100);
        let expected: Vec<f64> = (51..=150).map(|i| i as f64).collect();
        assert_eq!(ring.as_vec(), expected);
    }

    #[test]
    fn test_latency_ring_partial_fill_order() {
        let mut ring = LatencyRing::new(100);
        ring.push(5.0);
        ring.push(7.0);

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.as_vec(), vec![5.0, 7.0]);
    }

    #[test]
    fn test_latency_ring_stats() {
        let mut ring = LatencyRing::new(4);
        ring.push(10.0);
        ring.push(20.0);
        ring.push(30.0);

        let stats = ring.stats();
        assert_eq!(stats.avg, 20.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
    }

    #[test]
    fn test_latency_ring_stats_empty() {
        let ring = LatencyRing::new(4);
        let stats = ring.stats();
        assert_eq!(stats.avg, 0.0);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 0.0);
    }

    #[test]
    fn test_latency_ring_stats_after_wraparound() {
        let mut ring = LatencyRing::new(3);
        for sample in [100.0, 1.0, 2.0, 3.0] {
            ring.push(sample);
        }

        // The 100.0 sample has been evicted.
        let stats = ring.stats();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.avg, 2.0);
    }

    #[test]
    fn test_log_ring_evicts_oldest() {
        let mut ring = LogRing::new(1000);
        for i in 0..1500 {
            ring.push(LogEntry::now("system.Test", LogLevel::Info, format!("line {i}")));
        }

        assert_eq!(ring.len(), 1000);
        // The oldest 500 were evicted; the first retained line is 500.
        let tail = ring.tail(1000);
        assert_eq!(tail[0].message, "line 500");
        assert_eq!(tail[999].message, "line 1499");
    }

    #[test]
    fn test_log_ring_tail_returns_most_recent() {
        let mut ring = LogRing::new(1000);
        for i in 0..1500 {
            ring.push(LogEntry::now("system.Test", LogLevel::Info, format!("line {i}")));
        }

        let tail = ring.tail(100);
        assert_eq!(tail.len(), 100);
        assert_eq!(tail[0].message, "line 1400");
        assert_eq!(tail[99].message, "line 1499");
    }

    #[test]
    fn test_log_ring_tail_smaller_than_limit() {
        let mut ring = LogRing::new(1000);
        ring.push(LogEntry::now("system.Test", LogLevel::Warning, "only line"));

        let tail = ring.tail(100);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].level, LogLevel::Warning);
    }

    #[test]
    fn test_log_level_serialization_is_lowercase() {
        let json = serde_json::to_string(&LogLevel::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
