//! Injected time source.

use crate::domain::TimeMs;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> TimeMs;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeMs {
        TimeMs::now()
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: TimeMs) -> Self {
        Self {
            now_ms: AtomicI64::new(start.as_ms()),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, at: TimeMs) {
        self.now_ms.store(at.as_ms(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeMs {
        TimeMs::new(self.now_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(TimeMs::new(1_000));
        clock.advance_ms(500);
        assert_eq!(clock.now(), TimeMs::new(1_500));
        clock.set(TimeMs::new(10));
        assert_eq!(clock.now(), TimeMs::new(10));
    }
}
