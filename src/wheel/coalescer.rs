//! Merges wheel deltas from every adapter into one pending sum and hands
//! the UI context at most one flush at a time.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use super::decode::WHEEL_DELTA;
use super::throttle::Throttle;

pub const BACKLOG_WARN_THRESHOLD: u64 = 120;
pub const BACKLOG_LOG_INTERVAL: Duration = Duration::from_secs(3);
/// Percentage points per notch.
pub const STEP_PER_NOTCH: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelSource {
    Notify,
    LowLevelHook,
    RawInput,
}

impl fmt::Display for WheelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WheelSource::Notify => "notify",
            WheelSource::LowLevelHook => "llhook",
            WheelSource::RawInput => "rawinput",
        })
    }
}

/// Posts one flush callback onto the UI-owned context.
pub trait FlushScheduler: Send + Sync {
    fn schedule_flush(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelStats {
    pub pending_delta: i64,
    pub flush_scheduled: bool,
    pub enqueued: u64,
    pub flushed: u64,
}

impl WheelStats {
    pub fn outstanding(&self) -> u64 {
        self.enqueued.saturating_sub(self.flushed)
    }
}

pub struct Coalescer {
    state: Mutex<WheelStats>,
    scheduler: Box<dyn FlushScheduler>,
    backlog_log: Throttle,
    memory_probe: fn() -> f64,
}

impl Coalescer {
    pub fn new(scheduler: Box<dyn FlushScheduler>, memory_probe: fn() -> f64) -> Self {
        Self {
            state: Mutex::new(WheelStats::default()),
            scheduler,
            backlog_log: Throttle::new(BACKLOG_LOG_INTERVAL),
            memory_probe,
        }
    }

    /// Safe to call from any adapter thread.
    pub fn enqueue(&self, delta: i32, source: WheelSource) {
        if delta == 0 {
            return;
        }

        let (should_schedule, snapshot) = {
            let mut st = self.state.lock();
            st.pending_delta += delta as i64;
            st.enqueued += 1;
            let should_schedule = !st.flush_scheduled;
            st.flush_scheduled = true;
            (should_schedule, *st)
        };

        let outstanding = snapshot.outstanding();
        if outstanding > BACKLOG_WARN_THRESHOLD && self.backlog_log.ready_at(Instant::now()) {
            info!(
                "wheel-queue backlog pending={} enqueued={} flushed={} source={} private_mb={:.1}",
                outstanding,
                snapshot.enqueued,
                snapshot.flushed,
                source,
                (self.memory_probe)(),
            );
        }

        // Scheduled outside the lock so a slow UI queue never stalls capture.
        if should_schedule {
            self.scheduler.schedule_flush();
        }
    }

    /// Takes the pending sum and re-arms scheduling. UI context only.
    pub fn drain(&self) -> i64 {
        let mut st = self.state.lock();
        let delta = std::mem::take(&mut st.pending_delta);
        st.flushed = st.enqueued;
        st.flush_scheduled = false;
        delta
    }

    pub fn stats(&self) -> WheelStats {
        *self.state.lock()
    }
}

/// Whole notches in a raw delta; sub-notch magnitudes count as one.
pub fn wheel_notches(delta: i64) -> i64 {
    if delta == 0 {
        0
    } else if delta.abs() >= WHEEL_DELTA as i64 {
        delta / WHEEL_DELTA as i64
    } else {
        delta.signum()
    }
}

/// New brightness after a wheel flush, or `None` if nothing would change.
pub fn step_percent(current: u8, delta: i64) -> Option<u8> {
    let notches = wheel_notches(delta);
    if notches == 0 {
        return None;
    }
    let target = (current as i64)
        .saturating_add(notches.saturating_mul(STEP_PER_NOTCH))
        .clamp(0, 100) as u8;
    (target != current).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[derive(Clone, Default)]
    struct CountingScheduler(Arc<AtomicUsize>);

    impl FlushScheduler for CountingScheduler {
        fn schedule_flush(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coalescer() -> (Coalescer, Arc<AtomicUsize>) {
        let sched = CountingScheduler::default();
        let count = sched.0.clone();
        (Coalescer::new(Box::new(sched), || 0.0), count)
    }

    #[test]
    fn burst_schedules_exactly_once() {
        let (c, scheduled) = coalescer();
        for _ in 0..500 {
            c.enqueue(120, WheelSource::LowLevelHook);
        }
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
        assert!(c.stats().flush_scheduled);
        assert_eq!(c.drain(), 60_000);
        assert!(!c.stats().flush_scheduled);

        c.enqueue(-120, WheelSource::Notify);
        assert_eq!(scheduled.load(Ordering::SeqCst), 2);
    }

    static BACKLOG_SAMPLES: AtomicUsize = AtomicUsize::new(0);

    fn counting_probe() -> f64 {
        BACKLOG_SAMPLES.fetch_add(1, Ordering::SeqCst);
        12.5
    }

    #[test]
    fn backlog_samples_memory_once_per_interval() {
        let c = Coalescer::new(Box::new(CountingScheduler::default()), counting_probe);
        for _ in 0..BACKLOG_WARN_THRESHOLD {
            c.enqueue(120, WheelSource::LowLevelHook);
        }
        assert_eq!(c.stats().outstanding(), 120);
        assert_eq!(BACKLOG_SAMPLES.load(Ordering::SeqCst), 0);

        c.enqueue(120, WheelSource::LowLevelHook);
        assert_eq!(BACKLOG_SAMPLES.load(Ordering::SeqCst), 1);

        for _ in 0..200 {
            c.enqueue(-120, WheelSource::RawInput);
        }
        assert_eq!(c.stats().outstanding(), 321);
        assert_eq!(BACKLOG_SAMPLES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_delta_is_ignored() {
        let (c, scheduled) = coalescer();
        c.enqueue(0, WheelSource::RawInput);
        assert_eq!(scheduled.load(Ordering::SeqCst), 0);
        assert_eq!(c.stats().enqueued, 0);
    }

    #[test]
    fn drain_resets_and_tracks_counters() {
        let (c, _) = coalescer();
        c.enqueue(120, WheelSource::Notify);
        c.enqueue(-240, WheelSource::RawInput);
        let before = c.stats();
        assert_eq!(before.outstanding(), 2);
        assert_eq!(c.drain(), -120);
        let after = c.stats();
        assert_eq!(after.pending_delta, 0);
        assert_eq!(after.enqueued, 2);
        assert_eq!(after.flushed, 2);
        assert_eq!(c.drain(), 0);
    }

    #[test]
    fn concurrent_enqueues_sum_exactly() {
        let (c, scheduled) = coalescer();
        let c = Arc::new(c);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let c = c.clone();
                thread::spawn(move || {
                    let delta = if i % 2 == 0 { 120 } else { -1 };
                    for _ in 0..1000 {
                        c.enqueue(delta, WheelSource::LowLevelHook);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.drain(), 4 * 1000 * 120 - 4 * 1000);
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(c.stats().flushed, 8000);
    }

    #[test]
    fn interleaved_drains_lose_nothing() {
        let (c, _) = coalescer();
        let c = Arc::new(c);
        let producer = {
            let c = c.clone();
            thread::spawn(move || {
                for _ in 0..5000 {
                    c.enqueue(120, WheelSource::Notify);
                }
            })
        };
        let mut total = 0;
        while !producer.is_finished() {
            total += c.drain();
        }
        producer.join().unwrap();
        total += c.drain();
        assert_eq!(total, 5000 * 120);
    }

    #[test]
    fn notch_conversion() {
        assert_eq!(wheel_notches(120), 1);
        assert_eq!(wheel_notches(-240), -2);
        assert_eq!(wheel_notches(50), 1);
        assert_eq!(wheel_notches(-50), -1);
        assert_eq!(wheel_notches(179), 1);
        assert_eq!(wheel_notches(0), 0);
    }

    #[test]
    fn step_moves_two_points_per_notch_and_clamps() {
        assert_eq!(step_percent(50, 120), Some(52));
        assert_eq!(step_percent(3, -240), Some(0));
        assert_eq!(step_percent(50, -240), Some(46));
        assert_eq!(step_percent(40, 50), Some(42));
        assert_eq!(step_percent(40, -50), Some(38));
        assert_eq!(step_percent(99, 120), Some(100));
        assert_eq!(step_percent(100, 120), None);
        assert_eq!(step_percent(0, -120), None);
        assert_eq!(step_percent(10, i64::MAX), Some(100));
    }

    #[test]
    fn two_scroll_ups_from_69_reach_73() {
        let first = step_percent(69, 120).unwrap();
        let second = step_percent(first, 120).unwrap();
        assert_eq!(second, 73);
    }

    #[test]
    fn repeated_scroll_up_never_exceeds_100() {
        let mut v = 99u8;
        for _ in 0..10 {
            if let Some(next) = step_percent(v, 120) {
                v = next;
            }
            assert!(v <= 100);
        }
        assert_eq!(v, 100);
    }
}
