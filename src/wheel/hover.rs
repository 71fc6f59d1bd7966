//! "Pointer is near our tray icon" memory shared by all adapters.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use super::throttle::Throttle;

pub const HOVER_GRACE: Duration = Duration::from_millis(1800);
pub const HOVER_RADIUS_PX: i32 = 72;

#[derive(Debug, Clone, Copy, Default)]
struct HoverState {
    anchor: Option<(i32, i32)>,
    expires_at: Option<Instant>,
}

pub struct HoverTracker {
    state: Mutex<HoverState>,
    bad_anchor_log: Throttle,
}

impl Default for HoverTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HoverTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HoverState::default()),
            bad_anchor_log: Throttle::new(Duration::from_secs(2)),
        }
    }

    pub fn refresh(&self, x: i32, y: i32) {
        self.refresh_at(x, y, Instant::now());
    }

    /// Records `(x, y)` as the latest position near the icon and pushes the
    /// deadline to `now + HOVER_GRACE`.
    ///
    /// `(0, 0)` is a placeholder some shell callback paths inject: it keeps
    /// the hover alive but never becomes the anchor.
    pub fn refresh_at(&self, x: i32, y: i32, now: Instant) {
        let mut st = self.state.lock();
        st.expires_at = Some(now + HOVER_GRACE);
        if x == 0 && y == 0 {
            drop(st);
            if self.bad_anchor_log.ready_at(now) {
                warn!("wheel-hover ignored-invalid-anchor x=0 y=0");
            }
            return;
        }
        st.anchor = Some((x, y));
    }

    pub fn is_recent(&self, x: i32, y: i32) -> bool {
        self.is_recent_at(x, y, Instant::now())
    }

    pub fn is_recent_at(&self, x: i32, y: i32, now: Instant) -> bool {
        let st = *self.state.lock();
        match st.expires_at {
            Some(deadline) if now <= deadline => {}
            _ => return false,
        }
        match st.anchor {
            None => true,
            Some((ax, ay)) => (x - ax).abs() <= HOVER_RADIUS_PX && (y - ay).abs() <= HOVER_RADIUS_PX,
        }
    }

    /// Remaining grace time, for diagnostics.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.state
            .lock()
            .expires_at
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn anchor(&self) -> Option<(i32, i32)> {
        self.state.lock().anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_recent_before_first_refresh() {
        let h = HoverTracker::new();
        assert!(!h.is_recent_at(10, 10, Instant::now()));
    }

    #[test]
    fn recent_right_after_refresh_and_expires_after_grace() {
        let h = HoverTracker::new();
        let t0 = Instant::now();
        h.refresh_at(1800, 1050, t0);
        assert!(h.is_recent_at(1800, 1050, t0));
        assert!(h.is_recent_at(1800, 1050, t0 + HOVER_GRACE));
        assert!(!h.is_recent_at(1800, 1050, t0 + HOVER_GRACE + Duration::from_millis(1)));
    }

    #[test]
    fn radius_is_checked_per_axis() {
        let h = HoverTracker::new();
        let t0 = Instant::now();
        h.refresh_at(1000, 1000, t0);
        assert!(h.is_recent_at(1072, 928, t0));
        assert!(!h.is_recent_at(1073, 1000, t0));
        assert!(!h.is_recent_at(1000, 927, t0));
    }

    #[test]
    fn zero_anchor_extends_deadline_without_moving_anchor() {
        let h = HoverTracker::new();
        let t0 = Instant::now();
        h.refresh_at(500, 500, t0);
        let later = t0 + Duration::from_millis(1500);
        h.refresh_at(0, 0, later);
        assert_eq!(h.anchor(), Some((500, 500)));
        // Still valid past the first deadline because (0,0) pushed it.
        assert!(h.is_recent_at(500, 500, t0 + Duration::from_millis(3000)));
        assert!(!h.is_recent_at(0, 0, later));
    }

    #[test]
    fn zero_anchor_alone_accepts_any_point() {
        let h = HoverTracker::new();
        let t0 = Instant::now();
        h.refresh_at(0, 0, t0);
        assert_eq!(h.anchor(), None);
        assert!(h.is_recent_at(2400, 1400, t0));
    }
}
