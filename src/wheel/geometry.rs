//! Screen rectangle of our tray icon, resolved through the shell and
//! cached briefly.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use super::throttle::Throttle;
use super::{TrayWindow, WheelError};

pub const RECT_TTL: Duration = Duration::from_millis(350);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Edges are inclusive.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.left <= x && x <= self.right && self.top <= y && y <= self.bottom
    }
}

/// One successful geometry sample. Replaced wholesale, never patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrayRect {
    pub rect: Rect,
    pub sampled_at: Instant,
}

/// OS query: "where is the icon registered under (hwnd, uid)?".
pub trait IconRectQuery: Send + Sync {
    /// `false` when the running system has no such API.
    fn is_available(&self) -> bool;
    fn icon_rect(&self, hwnd: isize, uid: u32) -> Option<Rect>;
}

/// Identifiers the shell may key our icon under. The first one that
/// resolves becomes preferred and is tried first from then on.
#[derive(Debug, Clone)]
pub struct UidCandidates {
    candidates: Vec<u32>,
    preferred: Option<u32>,
}

impl UidCandidates {
    pub fn new(icon_uid: u32) -> Self {
        let mut candidates = Vec::with_capacity(2);
        for uid in [0, icon_uid] {
            if !candidates.contains(&uid) {
                candidates.push(uid);
            }
        }
        Self {
            candidates,
            preferred: None,
        }
    }

    pub fn preferred(&self) -> Option<u32> {
        self.preferred
    }

    pub fn try_order(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.candidates.len() + 1);
        for uid in self.preferred.into_iter().chain(self.candidates.iter().copied()) {
            if !order.contains(&uid) {
                order.push(uid);
            }
        }
        order
    }

    /// Returns `true` if the preferred uid changed.
    fn prefer(&mut self, uid: u32) -> bool {
        if self.preferred == Some(uid) {
            return false;
        }
        self.preferred = Some(uid);
        true
    }
}

pub struct GeometryResolver {
    query: Box<dyn IconRectQuery>,
    tray: TrayWindow,
    uids: Mutex<UidCandidates>,
    cache: Mutex<Option<TrayRect>>,
    fail_log: Throttle,
}

impl GeometryResolver {
    pub fn new(query: Box<dyn IconRectQuery>, tray: TrayWindow, icon_uid: u32) -> Self {
        Self {
            query,
            tray,
            uids: Mutex::new(UidCandidates::new(icon_uid)),
            cache: Mutex::new(None),
            fail_log: Throttle::new(Duration::from_secs(2)),
        }
    }

    pub fn uid_candidates(&self) -> UidCandidates {
        self.uids.lock().clone()
    }

    /// Uncached query, trying each uid candidate in order.
    pub fn resolve(&self) -> Result<Rect, WheelError> {
        let hwnd = self.tray.get().ok_or(WheelError::TrayNotCreated)?;
        if !self.query.is_available() {
            return Err(WheelError::GeometryUnavailable);
        }

        let order = self.uids.lock().try_order();
        for &uid in &order {
            if let Some(rect) = self.query.icon_rect(hwnd, uid) {
                if self.uids.lock().prefer(uid) {
                    info!("wheel-hit-test get-rect uid-selected uid={uid}");
                }
                return Ok(rect);
            }
        }
        Err(WheelError::NotFound { hwnd, tried: order })
    }

    pub fn rect(&self) -> Option<TrayRect> {
        self.rect_at(Instant::now())
    }

    /// Cached view: a sample younger than `RECT_TTL` is returned as is.
    pub fn rect_at(&self, now: Instant) -> Option<TrayRect> {
        if let Some(cached) = *self.cache.lock() {
            if now.saturating_duration_since(cached.sampled_at) <= RECT_TTL {
                return Some(cached);
            }
        }

        match self.resolve() {
            Ok(rect) => {
                let sample = TrayRect {
                    rect,
                    sampled_at: now,
                };
                *self.cache.lock() = Some(sample);
                Some(sample)
            }
            Err(e) => {
                if self.fail_log.ready_at(now) {
                    warn!("wheel-hit-test {e}");
                }
                None
            }
        }
    }

    /// Drops the cached sample, e.g. after the taskbar was recreated.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    pub fn hit_test(&self, x: i32, y: i32) -> bool {
        self.rect().is_some_and(|s| s.rect.contains(x, y))
    }
}
