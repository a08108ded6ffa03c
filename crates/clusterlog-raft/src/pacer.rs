//! Append pacing from observed round-trip latency.
//!
//! The pacer keeps the last few append round-trip times in a fixed-capacity
//! ring buffer with a running sum, so the mean is O(1) and memory is bounded.

/// Default number of round-trip samples kept per follower.
pub const DEFAULT_APPEND_WINDOW: usize = 8;

/// Sliding window of recent append round-trip times.
#[derive(Debug, Clone)]
pub struct AppendPacer {
    samples: Vec<u64>,
    capacity: usize,
    head: usize,
    sum: u128,
}

impl AppendPacer {
    /// Creates a pacer keeping at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            sum: 0,
        }
    }

    /// Records a round-trip time, evicting the oldest sample when full.
    pub fn record(&mut self, rtt_ms: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(rtt_ms);
        } else {
            let evicted = std::mem::replace(&mut self.samples[self.head], rtt_ms);
            self.sum -= u128::from(evicted);
            self.head = (self.head + 1) % self.capacity;
        }
        self.sum += u128::from(rtt_ms);
    }

    /// Mean round-trip time in milliseconds, or 0.0 without samples.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum as f64 / self.samples.len() as f64
        }
    }

    /// Minimum spacing between pipelined sends for a window of `max_in_flight`.
    pub fn send_interval(&self, max_in_flight: usize) -> f64 {
        self.mean() / max_in_flight.max(1) as f64
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no sample has been recorded since the last clear
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Window capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.head = 0;
        self.sum = 0;
    }
}

impl Default for AppendPacer {
    fn default() -> Self {
        Self::new(DEFAULT_APPEND_WINDOW)
    }
}
