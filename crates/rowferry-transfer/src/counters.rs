//! Run progress counters
//!
//! Monotonic relaxed atomics read by any task for progress display. They are
//! never used for correctness decisions; a racy read just shows a slightly
//! stale number.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated by the pipeline tasks
#[derive(Debug, Default)]
pub struct RunCounters {
    rows_read: AtomicU64,
    rows_queued_insert: AtomicU64,
    rows_committed: AtomicU64,
    file_rows: AtomicU64,
}

impl RunCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// One row materialized by the reader
    pub fn add_read(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    /// One row bound into the table sink batch
    pub fn add_queued_insert(&self) {
        self.rows_queued_insert.fetch_add(1, Ordering::Relaxed);
    }

    /// Rows committed by a batch execution
    pub fn add_committed(&self, rows: u64) {
        self.rows_committed.fetch_add(rows, Ordering::Relaxed);
    }

    /// One row written to the file sink
    pub fn add_file_row(&self) {
        self.file_rows.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset the file-row counter; called at file writer loop start
    pub fn reset_file_rows(&self) {
        self.file_rows.store(0, Ordering::Relaxed);
    }

    /// Rows read so far
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    /// Rows queued for insert so far
    pub fn rows_queued_insert(&self) -> u64 {
        self.rows_queued_insert.load(Ordering::Relaxed)
    }

    /// Rows committed so far
    pub fn rows_committed(&self) -> u64 {
        self.rows_committed.load(Ordering::Relaxed)
    }

    /// File rows written so far
    pub fn file_rows(&self) -> u64 {
        self.file_rows.load(Ordering::Relaxed)
    }

    /// Get a snapshot
    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            rows_read: self.rows_read(),
            rows_queued_insert: self.rows_queued_insert(),
            rows_committed: self.rows_committed(),
            file_rows: self.file_rows(),
        }
    }
}

/// Plain snapshot of the run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Rows materialized by the reader
    pub rows_read: u64,
    /// Rows bound into table sink batches
    pub rows_queued_insert: u64,
    /// Rows committed to the target table
    pub rows_committed: u64,
    /// Rows written to the file sink (header excluded)
    pub file_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let counters = RunCounters::new();
        counters.add_read();
        counters.add_read();
        counters.add_queued_insert();
        counters.add_committed(2);
        counters.add_file_row();

        let stats = counters.snapshot();
        assert_eq!(stats.rows_read, 2);
        assert_eq!(stats.rows_queued_insert, 1);
        assert_eq!(stats.rows_committed, 2);
        assert_eq!(stats.file_rows, 1);
    }

    #[test]
    fn test_file_rows_reset() {
        let counters = RunCounters::new();
        counters.add_file_row();
        counters.reset_file_rows();
        assert_eq!(counters.file_rows(), 0);
    }
}
