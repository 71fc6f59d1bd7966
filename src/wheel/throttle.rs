use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Admits at most one caller per interval. Used to keep repeated
/// diagnostics from flooding the log.
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn ready_at(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(t) if now.saturating_duration_since(t) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
