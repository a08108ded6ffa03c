//! Clock capability injected into replication state.
//!
//! Every timestamp the leader records about a follower (append send time,
//! heartbeat and response times, failure streak start) is read from a single
//! [`Clock`] handed over at construction. Production code uses the monotonic
//! [`SystemClock`]; tests drive a [`ManualClock`] explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::types::Millis;

/// Source of monotonic milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds. Never decreases.
    fn now_millis(&self) -> Millis;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Monotonic clock measuring milliseconds since its creation.
///
/// Starts at 1 so that a recorded timestamp is never confused with the
/// "unset" value 0.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Creates a shared handle to a new system clock
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        self.origin.elapsed().as_millis() as u64 + 1
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock reading `start` milliseconds
    pub fn new(start: Millis) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Moves the clock forward by `delta` milliseconds
    pub fn advance(&self, delta: Millis) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    /// Sets the clock to `to` if that is later than the current reading
    pub fn set(&self, to: Millis) {
        self.now.fetch_max(to, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 1_250);
    }

    #[test]
    fn test_manual_clock_set_never_goes_back() {
        let clock = ManualClock::new(500);
        clock.set(100);
        assert_eq!(clock.now_millis(), 500);
        clock.set(900);
        assert_eq!(clock.now_millis(), 900);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(a >= 1);
        assert!(b >= a);
    }
}
