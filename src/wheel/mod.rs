//! Mouse-wheel-over-tray-icon capture.
//!
//! Three independent adapters (tray callback interception, a low-level mouse
//! hook and raw input) feed one [`Coalescer`]. Each adapter only decides
//! whether an event belongs to our icon; the decisions live on
//! [`WheelContext`] so they are shared and testable, while the Win32 glue
//! sits in the `#[cfg(windows)]` submodules.

pub mod coalescer;
pub mod decode;
pub mod geometry;
pub mod hover;
pub mod throttle;

#[cfg(windows)]
mod llhook;
#[cfg(windows)]
mod notify;
#[cfg(windows)]
pub mod os;
#[cfg(windows)]
mod rawinput;
#[cfg(windows)]
mod subsystem;

#[cfg(windows)]
pub use subsystem::WheelSubsystem;

use std::fmt;
use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use coalescer::{Coalescer, FlushScheduler, WheelSource};
use geometry::{GeometryResolver, IconRectQuery};
use hover::HoverTracker;
use throttle::Throttle;

pub const HOOK_MISS_LOG_INTERVAL: Duration = Duration::from_millis(1200);
/// Raw tray callbacks logged verbatim before going quiet.
pub const NOTIFY_LOG_BUDGET: u64 = 60;

#[derive(Debug, Error)]
pub enum WheelError {
    #[error("{adapter} setup failed: {reason}")]
    SetupFailure {
        adapter: &'static str,
        reason: String,
    },
    #[error("tray-hwnd-missing")]
    TrayNotCreated,
    #[error("Shell_NotifyIconGetRect missing")]
    GeometryUnavailable,
    #[error("get-rect-failed hwnd={hwnd:#x} tried_uid={tried:?}")]
    NotFound { hwnd: isize, tried: Vec<u32> },
}

impl WheelError {
    pub fn setup(adapter: &'static str, reason: impl fmt::Display) -> Self {
        WheelError::SetupFailure {
            adapter,
            reason: reason.to_string(),
        }
    }
}

/// Window handle of the tray icon's owner, published once the tray thread
/// has created it. `0` means "not yet".
#[derive(Clone, Default)]
pub struct TrayWindow(Arc<AtomicIsize>);

impl TrayWindow {
    pub fn set(&self, hwnd: isize) {
        self.0.store(hwnd, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub fn get(&self) -> Option<isize> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            h => Some(h),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Rect,
    Hover,
}

impl fmt::Display for HitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HitKind::Rect => "rect",
            HitKind::Hover => "hover",
        })
    }
}

/// What the tray callback interceptor should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Wheel callback handled here; do not chain.
    Consumed,
    /// Pass on to the previous window procedure.
    Chain,
}

#[derive(Default)]
pub struct HookCounters {
    pub events: AtomicU64,
    pub misses: AtomicU64,
}

/// State shared by all adapters for the process lifetime.
pub struct WheelContext {
    pub tray: TrayWindow,
    pub geometry: GeometryResolver,
    pub hover: HoverTracker,
    pub coalescer: Coalescer,
    pub hook: HookCounters,
    notify_events: AtomicU64,
    hook_miss_log: Throttle,
}

impl WheelContext {
    pub fn new(
        tray: TrayWindow,
        query: Box<dyn IconRectQuery>,
        icon_uid: u32,
        scheduler: Box<dyn FlushScheduler>,
        memory_probe: fn() -> f64,
    ) -> Self {
        Self {
            geometry: GeometryResolver::new(query, tray.clone(), icon_uid),
            tray,
            hover: HoverTracker::new(),
            coalescer: Coalescer::new(scheduler, memory_probe),
            hook: HookCounters::default(),
            notify_events: AtomicU64::new(0),
            hook_miss_log: Throttle::new(HOOK_MISS_LOG_INTERVAL),
        }
    }

    /// Exact rectangle first, hover memory as the fallback.
    pub fn hit(&self, x: i32, y: i32) -> Option<HitKind> {
        if self.geometry.hit_test(x, y) {
            Some(HitKind::Rect)
        } else if self.hover.is_recent(x, y) {
            Some(HitKind::Hover)
        } else {
            None
        }
    }

    /// Tray callback (`uCallbackMessage`) handling.
    ///
    /// Any mouse activity over the icon primes hover; a wheel callback is
    /// decoded and consumed even when no delta could be found.
    pub fn on_notify(&self, raw_wparam: u32, raw_lparam: u32, cursor: Option<(i32, i32)>) -> NotifyOutcome {
        let count = self.notify_events.fetch_add(1, Ordering::Relaxed) + 1;
        if count <= NOTIFY_LOG_BUDGET {
            info!(
                "wheel-notify raw count={} l=0x{:08X} low=0x{:04X} high=0x{:04X} w=0x{:08X}",
                count,
                raw_lparam,
                raw_lparam & 0xFFFF,
                raw_lparam >> 16,
                raw_wparam,
            );
        }

        let code = decode::notify_event_code(raw_lparam);
        if decode::is_mouse_message(code) {
            let (x, y) = cursor.unwrap_or_else(|| decode::notify_anchor(raw_wparam));
            self.hover.refresh(x, y);
        }
        if code != decode::WM_MOUSEWHEEL {
            return NotifyOutcome::Chain;
        }

        let delta = decode::notify_wheel_delta(raw_wparam, raw_lparam);
        if delta != 0 {
            info!("wheel-notify wheel-event delta={delta} raww=0x{raw_wparam:08X} rawl=0x{raw_lparam:08X}");
            self.coalescer.enqueue(delta, WheelSource::Notify);
        } else {
            warn!("wheel-notify wheel-event delta-missing");
        }
        NotifyOutcome::Consumed
    }

    /// Low-level hook `WM_MOUSEWHEEL` handling. Returns whether the event
    /// was attributed to our icon.
    pub fn on_hook_wheel(&self, x: i32, y: i32, mouse_data: u32) -> bool {
        let delta = decode::hook_wheel_delta(mouse_data);
        if delta == 0 {
            return false;
        }
        let event_id = self.hook.events.fetch_add(1, Ordering::Relaxed) + 1;

        match self.hit(x, y) {
            Some(kind) => {
                // Keeps long wheel sessions alive while rect lookups flicker.
                self.hover.refresh(x, y);
                info!("wheel-llhook event={event_id} delta={delta} x={x} y={y} hit=true source={kind}");
                self.coalescer.enqueue(delta, WheelSource::LowLevelHook);
                true
            }
            None => {
                let misses = self.hook.misses.fetch_add(1, Ordering::Relaxed) + 1;
                let now = Instant::now();
                if self.hook_miss_log.ready_at(now) {
                    info!(
                        "wheel-llhook miss event={} miss_count={} x={} y={} hover_left_ms={} anchor={:?}",
                        event_id,
                        misses,
                        x,
                        y,
                        self.hover.remaining_at(now).as_millis(),
                        self.hover.anchor(),
                    );
                }
                false
            }
        }
    }

    /// `WM_INPUT` handling. The record is only fetched once the cursor is
    /// known to be over (or recently near) the icon.
    pub fn on_raw_input<F>(&self, cursor: Option<(i32, i32)>, fetch_record: F) -> bool
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        let Some((x, y)) = cursor else {
            return false;
        };
        let Some(kind) = self.hit(x, y) else {
            return false;
        };
        let delta = fetch_record()
            .map(|rec| decode::raw_input_wheel_delta(&rec))
            .unwrap_or(0);
        if delta == 0 {
            return false;
        }

        info!("wheel-rawinput delta={delta} hit={kind}");
        self.hover.refresh(x, y);
        self.coalescer.enqueue(delta, WheelSource::RawInput);
        true
    }

    pub fn on_taskbar_recreated(&self) {
        info!("wheel-taskbarcreated received");
        self.geometry.invalidate();
    }
}

/// Private bytes of this process in MiB, `0.0` when unknown.
pub fn private_mb() -> f64 {
    #[cfg(windows)]
    {
        os::private_mb()
    }
    #[cfg(not(windows))]
    {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::geometry::Rect;
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct FixedShell(Option<Rect>);

    impl IconRectQuery for FixedShell {
        fn is_available(&self) -> bool {
            true
        }

        fn icon_rect(&self, _hwnd: isize, _uid: u32) -> Option<Rect> {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct Flushes(Arc<AtomicUsize>);

    impl FlushScheduler for Flushes {
        fn schedule_flush(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    const ICON: Rect = Rect::new(1800, 1040, 1824, 1064);

    fn context(rect: Option<Rect>) -> (WheelContext, Arc<AtomicUsize>) {
        let tray = TrayWindow::default();
        tray.set(0x42);
        let flushes = Flushes::default();
        let count = flushes.0.clone();
        let ctx = WheelContext::new(tray, Box::new(FixedShell(rect)), 1, Box::new(flushes), || 0.0);
        (ctx, count)
    }

    fn pack(high: i16, low: u16) -> u32 {
        ((high as u16 as u32) << 16) | low as u32
    }

    #[test]
    fn tray_window_reports_unset_as_none() {
        let t = TrayWindow::default();
        assert_eq!(t.get(), None);
        t.set(9);
        assert_eq!(t.get(), Some(9));
        t.clear();
        assert_eq!(t.get(), None);
    }

    #[test]
    fn hit_prefers_rect_then_hover() {
        let (ctx, _) = context(Some(ICON));
        assert_eq!(ctx.hit(1810, 1050), Some(HitKind::Rect));
        assert_eq!(ctx.hit(1700, 1050), None);
        ctx.hover.refresh(1700, 1050);
        assert_eq!(ctx.hit(1710, 1050), Some(HitKind::Hover));
    }

    #[test]
    fn notify_wheel_is_consumed_and_enqueued() {
        let (ctx, flushes) = context(None);
        let outcome = ctx.on_notify(pack(240, 0), 0x020A, Some((1810, 1050)));
        assert_eq!(outcome, NotifyOutcome::Consumed);
        assert_eq!(ctx.coalescer.drain(), 240);
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        assert!(ctx.hover.is_recent(1810, 1050));
    }

    #[test]
    fn notify_wheel_without_delta_is_still_consumed() {
        let (ctx, flushes) = context(None);
        let outcome = ctx.on_notify(pack(1050, 1810), pack(1, 0x020A), None);
        assert_eq!(outcome, NotifyOutcome::Consumed);
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
        // The anchor came from wParam since no cursor was available.
        assert_eq!(ctx.hover.anchor(), Some((1810, 1050)));
    }

    #[test]
    fn notify_non_wheel_chains() {
        let (ctx, _) = context(None);
        assert_eq!(ctx.on_notify(0, 0x0202, Some((5, 5))), NotifyOutcome::Chain);
        assert_eq!(ctx.on_notify(0, 0x0400, Some((5, 5))), NotifyOutcome::Chain);
        assert_eq!(ctx.hover.anchor(), Some((5, 5)));
    }

    #[test]
    fn hook_wheel_over_icon_is_enqueued() {
        let (ctx, _) = context(Some(ICON));
        assert!(ctx.on_hook_wheel(1812, 1052, pack(-120, 0)));
        assert_eq!(ctx.coalescer.drain(), -120);
        assert_eq!(ctx.hook.events.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn hook_wheel_elsewhere_is_counted_as_miss() {
        let (ctx, flushes) = context(Some(ICON));
        assert!(!ctx.on_hook_wheel(200, 200, pack(120, 0)));
        assert!(!ctx.on_hook_wheel(200, 200, pack(120, 0)));
        assert_eq!(ctx.hook.misses.load(Ordering::Relaxed), 2);
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hook_accepts_via_hover_when_rect_lookup_fails() {
        let (ctx, _) = context(None);
        ctx.hover.refresh(1810, 1050);
        assert!(ctx.on_hook_wheel(1830, 1060, pack(120, 0)));
        // Hover follows the accepted point.
        assert_eq!(ctx.hover.anchor(), Some((1830, 1060)));
    }

    #[test]
    fn raw_input_skips_fetch_when_not_over_icon() {
        let (ctx, _) = context(Some(ICON));
        let fetched = Mutex::new(false);
        assert!(!ctx.on_raw_input(Some((10, 10)), || {
            *fetched.lock() = true;
            None
        }));
        assert!(!*fetched.lock());
        assert!(!ctx.on_raw_input(None, || None));
    }

    #[test]
    fn raw_input_failed_fetch_yields_nothing() {
        let (ctx, flushes) = context(Some(ICON));
        assert!(!ctx.on_raw_input(Some((1810, 1050)), || None));
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
        assert!(ctx.hover.anchor().is_none());
    }

    #[test]
    fn taskbar_recreated_invalidates_geometry() {
        let (ctx, _) = context(Some(ICON));
        let first = ctx.geometry.rect().unwrap();
        ctx.on_taskbar_recreated();
        std::thread::sleep(Duration::from_millis(2));
        let second = ctx.geometry.rect().unwrap();
        assert_ne!(first.sampled_at, second.sampled_at);
    }
}
