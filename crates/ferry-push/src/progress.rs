//! Progress reporting.
//!
//! A run announces how many units it will complete, then advances once per
//! completed unit, skipped units included.

use parking_lot::Mutex;

/// Receives progress notifications from a run.
pub trait ProgressSink: Send + Sync {
    /// Sets the number of units the run will complete.
    fn set_capacity(&self, total: usize);

    /// Records one completed unit.
    fn advance(&self);
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    completed: usize,
    capacity: usize,
}

/// A counting progress sink.
///
/// Updates are serialized, so observers see `completed` increase by exactly
/// one per call.
#[derive(Debug, Default)]
pub struct ProgressGauge {
    counts: Mutex<Counts>,
}

impl ProgressGauge {
    /// Creates a gauge at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Units completed so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.counts.lock().completed
    }

    /// Units announced for the run.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.counts.lock().capacity
    }

    /// Advances and returns `(completed, capacity)` after the update.
    fn increment(&self) -> (usize, usize) {
        let mut counts = self.counts.lock();
        counts.completed += 1;
        (counts.completed, counts.capacity)
    }
}

impl ProgressSink for ProgressGauge {
    fn set_capacity(&self, total: usize) {
        let mut counts = self.counts.lock();
        counts.capacity = total;
        counts.completed = 0;
    }

    fn advance(&self) {
        self.increment();
    }
}

/// Progress sink that logs each completed unit through `tracing`.
#[derive(Debug)]
pub struct LogProgress {
    status: String,
    gauge: ProgressGauge,
}

impl LogProgress {
    /// Creates a sink that prefixes log lines with `status`.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            gauge: ProgressGauge::new(),
        }
    }
}

impl ProgressSink for LogProgress {
    fn set_capacity(&self, total: usize) {
        self.gauge.set_capacity(total);
        tracing::info!(total, "{}", self.status);
    }

    fn advance(&self) {
        let (completed, capacity) = self.gauge.increment();
        tracing::info!(completed, total = capacity, "{}", self.status);
    }
}
